// potfit-domain library entry point
pub mod calculation;
pub mod distribution;
pub mod error;
pub mod hashing;
pub mod structure;
pub mod units;

pub use calculation::{CalcStatus, CalculationKey, CalculationRecord};
pub use distribution::DistributionFunction;
pub use error::DomainError;
pub use structure::{Atom, Fragment, Structure};
