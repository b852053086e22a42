pub mod nominatim;
pub mod rate_limiter;
pub mod resolver;

pub use nominatim::NominatimResolver;
pub use resolver::GeoResolver;
