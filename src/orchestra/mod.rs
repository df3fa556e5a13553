pub mod communication;
pub mod driver;
pub mod error;
pub mod scanner;
pub mod worker;
