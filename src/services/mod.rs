// Booking and settlement
pub mod appointments;
pub mod payments;

// Catalog administration
pub mod catalog;

// Pure rules shared by the services above
pub mod appointment_status;
pub mod payment_status;
pub mod pricing;

pub use appointments::AppointmentService;
pub use catalog::CatalogService;
pub use payments::PaymentService;
