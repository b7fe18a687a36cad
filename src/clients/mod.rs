pub mod email;
pub mod health;
pub mod rbmq;
pub mod template;
