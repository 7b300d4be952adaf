pub mod accuracy;
pub mod align;
pub mod collect;
pub mod quality;
pub mod retention;
pub mod upstream;
