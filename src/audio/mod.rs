pub mod db;
pub mod decode;
pub mod features;
pub mod frame;
pub mod mel;
pub mod spectrum;
