//! The standard security handler.
//!
//! Supports revisions 2 through 4 with RC4 (encryption versions 1 and 2).
//! Crypt-filter documents using AES (V4 with AESV2, V5) are recognized but
//! unsupported: authentication reports failure and the document stays
//! readable for metadata only. Authentication never raises.

use crate::object::name::keys;
use crate::object::{Dict, Value};

mod md5;
mod rc4;

use md5::md5;
use rc4::Rc4;

const PASSWORD_PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// A decryption handle built from the trailer's `Encrypt` dictionary and
/// the file `ID`.
pub struct Crypt {
    version: i32,
    revision: i32,
    key_len: usize,
    owner: Vec<u8>,
    user: Vec<u8>,
    permissions: u32,
    file_id: Vec<u8>,
    encrypt_metadata: bool,
    supported: bool,
    key: Option<Vec<u8>>,
}

impl Crypt {
    /// Gather the handler parameters. Never fails; unsupported algorithms
    /// produce a handle that refuses to authenticate.
    pub fn new(dict: &Dict, file_id: &[u8]) -> Self {
        let filter = dict.get(keys::FILTER).as_name();
        let version = dict.get(keys::V).as_int();
        let revision = dict.get(keys::R).as_int();

        let supported = &*filter == b"Standard" && matches!(version, 1 | 2);

        if !supported {
            log::warn!(
                "unsupported encryption (filter {}, V {version}); document usable for metadata only",
                filter.as_str()
            );
        }

        let key_bits = match version {
            1 => 40,
            _ => {
                let length = dict.get(keys::LENGTH).as_int();
                if length > 0 {
                    length
                } else {
                    40
                }
            }
        };

        let permissions = {
            let raw = dict.get(keys::P).as_int();
            raw as u32
        };

        Self {
            version,
            revision,
            key_len: (key_bits / 8).clamp(5, 16) as usize,
            owner: dict.get(keys::O).as_string().to_vec(),
            user: dict.get(keys::U).as_string().to_vec(),
            permissions,
            file_id: file_id.to_vec(),
            encrypt_metadata: match dict.get(keys::ENCRYPT_META_DATA) {
                Value::Bool(b) => b,
                _ => true,
            },
            supported,
            key: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn is_authenticated(&self) -> bool {
        self.key.is_some()
    }

    /// Try a password, first as the user password and then as the owner
    /// password. Returns whether authentication succeeded.
    pub fn authenticate(&mut self, password: &[u8]) -> bool {
        if !self.supported {
            return false;
        }

        if let Some(key) = self.check_user_password(password) {
            self.key = Some(key);
            return true;
        }

        // The owner password decrypts the O entry into the user password.
        let user_password = self.user_password_from_owner(password);
        if let Some(key) = self.check_user_password(&user_password) {
            self.key = Some(key);
            return true;
        }

        false
    }

    /// Decrypt string or stream bytes belonging to object (num, gen).
    pub fn decrypt(&self, num: i32, gen: i32, data: &[u8]) -> Vec<u8> {
        let Some(file_key) = &self.key else {
            return data.to_vec();
        };

        let mut input = Vec::with_capacity(file_key.len() + 5);
        input.extend_from_slice(file_key);
        input.extend_from_slice(&num.to_le_bytes()[0..3]);
        input.extend_from_slice(&gen.to_le_bytes()[0..2]);

        let digest = md5(&input);
        let object_key = &digest[..(file_key.len() + 5).min(16)];

        Rc4::new(object_key).apply(data)
    }

    /// Decrypt a freshly parsed value: a top-level string is replaced,
    /// containers are rewritten in place.
    pub(crate) fn decrypt_value(&self, value: Value, num: i32, gen: i32) -> Value {
        match value {
            Value::String(s) => {
                Value::String(crate::object::PdfString::new(self.decrypt(num, gen, &s)))
            }
            other @ (Value::Array(_) | Value::Dict(_)) => {
                self.decrypt_strings(&other, num, gen);
                other
            }
            other => other,
        }
    }

    /// Decrypt every string reachable inside a freshly parsed value.
    pub(crate) fn decrypt_strings(&self, value: &Value, num: i32, gen: i32) {
        match value {
            Value::Array(array) => {
                for i in 0..array.len() {
                    let item = array.get_raw(i);
                    match &item {
                        Value::String(s) => {
                            let plain = self.decrypt(num, gen, s);
                            array.put(i, Value::String(crate::object::PdfString::new(plain)));
                        }
                        Value::Array(_) | Value::Dict(_) => self.decrypt_strings(&item, num, gen),
                        _ => {}
                    }
                }
            }
            Value::Dict(dict) => {
                for (key, item) in dict.entries() {
                    match &item {
                        Value::String(s) => {
                            let plain = self.decrypt(num, gen, s);
                            dict.put(key, Value::String(crate::object::PdfString::new(plain)));
                        }
                        Value::Array(_) | Value::Dict(_) => self.decrypt_strings(&item, num, gen),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    /// Algorithm 2: derive the file key from a padded password.
    fn compute_file_key(&self, password: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(96);
        input.extend_from_slice(&pad_password(password));
        input.extend_from_slice(&pad_bytes(&self.owner));
        input.extend_from_slice(&self.permissions.to_le_bytes());
        input.extend_from_slice(&self.file_id);

        if self.revision >= 4 && !self.encrypt_metadata {
            input.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        }

        let mut digest = md5(&input);

        if self.revision >= 3 {
            for _ in 0..50 {
                digest = md5(&digest[..self.key_len]);
            }
        }

        digest[..self.key_len].to_vec()
    }

    /// Algorithms 4/5: check a candidate user password, returning the file
    /// key on success.
    fn check_user_password(&self, password: &[u8]) -> Option<Vec<u8>> {
        let key = self.compute_file_key(password);

        let ok = if self.revision == 2 {
            Rc4::new(&key).apply(&PASSWORD_PAD) == self.user
        } else {
            let mut input = PASSWORD_PAD.to_vec();
            input.extend_from_slice(&self.file_id);
            let mut out = md5(&input).to_vec();

            for i in 0..=19u8 {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
                out = Rc4::new(&round_key).apply(&out);
            }

            self.user.len() >= 16 && out[..16] == self.user[..16]
        };

        ok.then_some(key)
    }

    /// Algorithm 7 (reversed): recover the user password from `O`.
    fn user_password_from_owner(&self, owner_password: &[u8]) -> Vec<u8> {
        let mut digest = md5(&pad_password(owner_password));

        if self.revision >= 3 {
            for _ in 0..50 {
                digest = md5(&digest);
            }
        }

        let key = &digest[..self.key_len];

        if self.revision == 2 {
            Rc4::new(key).apply(&self.owner)
        } else {
            let mut out = self.owner.clone();
            for i in (0..=19u8).rev() {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
                out = Rc4::new(&round_key).apply(&out);
            }
            out
        }
    }

    /// The encryption version, for diagnostics.
    pub fn version(&self) -> i32 {
        self.version
    }
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = password.len().min(32);
    out[..n].copy_from_slice(&password[..n]);
    out[n..].copy_from_slice(&PASSWORD_PAD[..32 - n]);
    out
}

/// Truncate or zero-pad a handler string to 32 bytes.
fn pad_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Array, Name, PdfString};

    #[test]
    fn unsupported_algorithms_do_not_authenticate() {
        let dict = Dict::new(4);
        dict.put_key(keys::FILTER, Value::Name(Name::new(b"Standard")));
        dict.put_key(keys::V, Value::Int(5));
        dict.put_key(keys::R, Value::Int(6));

        let mut crypt = Crypt::new(&dict, b"id");
        assert!(!crypt.is_supported());
        assert!(!crypt.authenticate(b""));
        assert!(!crypt.is_authenticated());
    }

    #[test]
    fn decrypt_without_key_passes_through() {
        let dict = Dict::new(0);
        let crypt = Crypt::new(&dict, b"");
        assert_eq!(crypt.decrypt(1, 0, b"data"), b"data");
    }

    #[test]
    fn string_walk_rewrites_nested_containers() {
        // A handle with a key installed directly, bypassing authentication.
        let dict = Dict::new(0);
        let mut crypt = Crypt::new(&dict, b"");
        crypt.key = Some(vec![1, 2, 3, 4, 5]);

        let secret = b"secret".to_vec();
        let encrypted = {
            // Encrypt with the same per-object key the walk will use.
            let cipher = crypt.decrypt(7, 0, &secret);
            cipher
        };

        let inner = Array::from_vec(vec![Value::String(PdfString::new(encrypted))]);
        let outer = Dict::new(1);
        outer.put_key(b"Data", Value::Array(inner));

        let value = Value::Dict(outer.clone());
        crypt.decrypt_strings(&value, 7, 0);

        let out = outer.get(b"Data").as_array().unwrap().get(0).as_string();
        assert_eq!(&*out, b"secret");
    }
}
