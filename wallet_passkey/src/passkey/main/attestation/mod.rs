mod core;
mod none;
mod packed;
mod u2f;
mod utils;

pub(super) use core::{format_aaguid, verify_attestation};
