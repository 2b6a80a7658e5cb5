pub mod drops;
pub mod farming;
pub mod settings;
