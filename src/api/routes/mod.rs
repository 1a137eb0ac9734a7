pub mod health;
pub mod lifecycle;
pub mod settings;
pub mod status;
