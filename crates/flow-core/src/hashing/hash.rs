//! Hash helpers: abstracción para poder cambiar de algoritmo sin tocar el
//! resto del core. Todos devuelven hex (64 caracteres, blake3).

use blake3::Hasher;
use serde_json::Value;

use super::to_canonical_json;

/// Hashea un string y devuelve hex.
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Hash del JSON canónico de `value`.
pub fn hash_value(value: &Value) -> String {
    hash_str(&to_canonical_json(value))
}

/// Deriva un identificador estable a partir de partes ordenadas. Las partes se
/// separan con un byte nulo para que `["ab", "c"]` y `["a", "bc"]` no
/// colisionen.
pub fn derive_id(parts: &[&str]) -> String {
    let mut h = Hasher::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            h.update(&[0u8]);
        }
        h.update(p.as_bytes());
    }
    h.finalize().to_hex().to_string()
}
