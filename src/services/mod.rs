pub mod account;
pub mod biometric;
pub mod device;
pub mod enrollment;
pub mod otp;
pub mod passkey;
pub mod token;

pub use account::AccountService;
pub use biometric::BiometricLoginService;
pub use device::DeviceService;
pub use enrollment::EnrollmentService;
pub use otp::OtpService;
pub use passkey::PasskeyService;
pub use token::TokenService;
