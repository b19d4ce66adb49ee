pub mod calendar;
pub mod conversation;
pub mod lead;
pub mod notification;
