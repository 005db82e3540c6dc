pub mod appointment;
pub mod appointment_detail;
pub mod catalog_service;
pub mod payment;
