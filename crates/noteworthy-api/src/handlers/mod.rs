pub mod compile;
pub mod generate;
pub mod health;
pub mod ws;
