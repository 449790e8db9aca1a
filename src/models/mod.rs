pub mod block;
pub mod click;
