#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
extern crate alloc;

// Shared token and math modules
pub mod token;
pub mod tokens;
pub mod errors;
pub mod events;
pub mod math;

// CDP vault engine
pub mod vaults;
