pub mod event;
pub mod health;
pub mod notification;
pub mod retry;
pub mod status;
pub mod template;
pub mod validation;
