pub mod constant_memory_reads;
pub mod dead_code_elimination;
pub mod verification;

pub use constant_memory_reads::constant_memory_reads;
pub use dead_code_elimination::dead_code_elimination;
pub use verification::verification_pass;
