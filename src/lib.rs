// Library module for sigscan
// Re-exports modules for use in integration tests and the binary

pub mod hash;
