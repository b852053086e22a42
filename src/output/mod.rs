// Output formatting: terminal display for the one-shot commands.

pub mod terminal;
