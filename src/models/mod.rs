pub mod application;
pub mod assignment;
pub mod feedback;
pub mod notification;
pub mod recommendation;
pub mod stage;
pub mod template;
pub mod user;
