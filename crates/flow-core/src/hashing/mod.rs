//! Módulo de hashing y canonicalización JSON.
//!
//! Se usa para derivar valores deterministas a partir del checkpoint (ids de
//! request externos, salts de privacidad) y para calcular el fingerprint de
//! cada petición de suspensión registrada en el journal de continuación.

pub mod canonical_json;
pub mod hash;

pub use canonical_json::to_canonical_json;
pub use hash::{derive_id, hash_str, hash_value};
