pub mod health;
pub mod status;
pub mod transcribe;
