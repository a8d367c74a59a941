pub mod appointment;
pub mod availability;
pub mod consultancy;
pub mod receipt;
pub mod session;
pub mod slot;

pub use appointment::{
    Appointment, AppointmentStatus, AppointmentType, Party, PaymentMethod, TransitionError,
};
pub use availability::{ConsultancyAvailability, WorkingHours};
pub use consultancy::{Consultancy, VerificationStatus};
pub use receipt::Receipt;
pub use session::{
    BookingStep, ChatMessage, ChatSession, ConsultancyRef, ContactDetails, ContactError,
};
pub use slot::SlotTime;
