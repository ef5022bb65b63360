pub mod account;
pub mod challenge;
pub mod device;
pub mod passkey;

pub use account::*;
pub use challenge::*;
pub use device::*;
pub use passkey::*;
