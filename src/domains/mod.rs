// Domain services, one module per subsystem
pub mod crm;
pub mod gamification;
pub mod history;
pub mod identity;
pub mod stores;
pub mod tickets;
