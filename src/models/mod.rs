pub mod comment;
pub mod cv;
pub mod like;
pub mod notification;
pub mod post;
pub mod user;
pub mod visitor;
