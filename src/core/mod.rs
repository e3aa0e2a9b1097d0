// Core modules: addressing, row munging, retry, and the adaptive read / chunked write loops.
pub mod a1;
pub mod error;
pub mod read;
pub mod retry;
pub mod rows;
pub mod sheets;
pub mod write;
