pub mod thumb;
