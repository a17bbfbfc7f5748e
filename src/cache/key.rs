use smallvec::SmallVec;

use crate::{
    composition::model::{MediaNode, MediaNodeKind, PromptReference},
    foundation::error::{ClipforgeError, ClipforgeResult},
    foundation::math::{StableHasher, sha256_hex},
    media::provider::ModelBindings,
};

#[derive(Clone, Debug, PartialEq)]
/// One primitive component of a [`CacheKey`].
pub enum KeyPart {
    /// Text component (kind, model identity, prompt, locator).
    Str(String),
    /// Digest of a prompt reference (nested key digest or SHA-256 of a literal locator).
    Ref(String),
    /// Named generation parameter.
    Param(&'static str, ParamValue),
}

#[derive(Clone, Debug, PartialEq)]
/// Typed generation parameter value.
pub enum ParamValue {
    /// Text value.
    Str(String),
    /// Integer value.
    U64(u64),
    /// Float value, hashed by bit pattern.
    F64(f64),
}

#[derive(Clone, Debug, PartialEq)]
/// Content-addressed identity of a media node, independent of its tree position.
pub struct CacheKey {
    parts: SmallVec<[KeyPart; 8]>,
    source: bool,
}

impl CacheKey {
    /// Ordered key parts.
    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// Whether this key identifies a literal source rather than a generation.
    pub fn is_source(&self) -> bool {
        self.source
    }

    /// XXH3-128 digest as 32 lowercase hex chars.
    pub fn digest(&self) -> String {
        let mut h = StableHasher::new();
        h.write_u64(self.parts.len() as u64);
        for p in &self.parts {
            match p {
                KeyPart::Str(s) => {
                    h.write_u8(0);
                    h.write_str(s);
                }
                KeyPart::Ref(d) => {
                    h.write_u8(1);
                    h.write_str(d);
                }
                KeyPart::Param(name, v) => {
                    h.write_u8(2);
                    h.write_str(name);
                    match v {
                        ParamValue::Str(s) => {
                            h.write_u8(0);
                            h.write_str(s);
                        }
                        ParamValue::U64(n) => {
                            h.write_u8(1);
                            h.write_u64(*n);
                        }
                        ParamValue::F64(f) => {
                            h.write_u8(2);
                            h.write_f64(*f);
                        }
                    }
                }
            }
        }
        h.finish_hex()
    }
}

/// Derive the cache key of `node` as a `kind` node.
///
/// Nodes with a literal `src` key on `(kind, "source", locator)`. Generated nodes key on kind,
/// model identity, prompt text, ordered reference digests and sorted generation parameters.
pub fn derive_key(
    node: &MediaNode,
    kind: MediaNodeKind,
    bindings: &ModelBindings,
) -> ClipforgeResult<CacheKey> {
    let mut parts = SmallVec::<[KeyPart; 8]>::new();
    parts.push(KeyPart::Str(kind.as_str().to_string()));

    if let Some(src) = &node.src {
        parts.push(KeyPart::Str("source".to_string()));
        parts.push(KeyPart::Str(src.clone()));
        return Ok(CacheKey {
            parts,
            source: true,
        });
    }

    let Some(prompt) = &node.prompt else {
        return Err(ClipforgeError::resolution(format!(
            "{} node has neither a prompt nor a src",
            kind.as_str()
        )));
    };
    let prompt = prompt.normalize()?;

    parts.push(KeyPart::Str(bindings.identity(kind, node.model.as_deref())));
    parts.push(KeyPart::Str(prompt.text));
    for r in &prompt.references {
        let digest = match r {
            PromptReference::Literal(locator) => sha256_hex(locator.as_bytes()),
            PromptReference::Media(k, n) => derive_key(n, *k, bindings)?.digest(),
        };
        parts.push(KeyPart::Ref(digest));
    }

    // Already in name order.
    if let Some(v) = &node.aspect_ratio {
        parts.push(KeyPart::Param("aspect_ratio", ParamValue::Str(v.clone())));
    }
    if let Some(v) = node.duration {
        parts.push(KeyPart::Param("duration", ParamValue::F64(v)));
    }
    if let Some(v) = node.seed {
        parts.push(KeyPart::Param("seed", ParamValue::U64(v)));
    }
    if let Some(v) = &node.size {
        parts.push(KeyPart::Param("size", ParamValue::Str(v.clone())));
    }
    if let Some(v) = &node.voice {
        parts.push(KeyPart::Param("voice", ParamValue::Str(v.clone())));
    }

    Ok(CacheKey {
        parts,
        source: false,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/cache/key.rs"]
mod tests;
