pub mod appointment;
pub mod bill;
pub mod doctor;
pub mod enums;
pub mod filters;
pub mod inventory;
pub mod medical_record;
pub mod money;
pub mod patch;
pub mod patient;
pub mod user;

pub use appointment::*;
pub use bill::*;
pub use doctor::*;
pub use enums::*;
pub use filters::*;
pub use inventory::*;
pub use medical_record::*;
pub use money::*;
pub use patient::*;
pub use user::*;
