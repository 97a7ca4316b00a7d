use crate::{
    Error,
    bus::Address,
    module::metadata::{HEADER, ID_OFFSET, IDENTITY_LEN, NAME_LEN, NAME_OFFSET, SIGNATURE_OFFSET},
};

/// Signature, id and name a module reports at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleIdentity {
    pub signature: u8,
    pub id: u8,
    name: [u8; NAME_LEN],
}

impl ModuleIdentity {
    /// Fails with [`Error::NameTooLong`] for names over eight bytes.
    pub fn new(signature: u8, id: u8, name: &str) -> Result<Self, Error> {
        let bytes = name.as_bytes();
        if bytes.len() > NAME_LEN {
            return Err(Error::NameTooLong);
        }
        let mut padded = [0u8; NAME_LEN];
        padded[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            signature,
            id,
            name: padded,
        })
    }

    /// NUL padded name field.
    pub fn name_bytes(&self) -> &[u8; NAME_LEN] {
        &self.name
    }

    /// Name up to the first NUL.
    pub fn name(&self) -> &str {
        name_str(&self.name)
    }

    /// Identity block as laid out on the wire.
    pub fn to_bytes(&self) -> [u8; IDENTITY_LEN] {
        let mut out = [0u8; IDENTITY_LEN];
        out[..HEADER.len()].copy_from_slice(&HEADER);
        out[SIGNATURE_OFFSET] = self.signature;
        out[ID_OFFSET] = self.id;
        out[NAME_OFFSET..NAME_OFFSET + NAME_LEN].copy_from_slice(&self.name);
        out
    }
}

/// Longest valid UTF-8 prefix before the first NUL.
pub(crate) fn name_str(raw: &[u8]) -> &str {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let raw = &raw[..end];
    match core::str::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
    }
}

/// Turns the consecutive-error count into a connection decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectPolicy {
    /// Failed cycles in a row after which the module counts as gone.
    pub threshold: u16,
}

impl DisconnectPolicy {
    pub const DEFAULT_THRESHOLD: u16 = 15;

    pub const fn new(threshold: u16) -> Self {
        Self { threshold }
    }

    pub fn is_disconnected(&self, consecutive_errors: u16) -> bool {
        consecutive_errors >= self.threshold
    }
}

impl Default for DisconnectPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

/// Peripheral-side configuration of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleConfig {
    pub address: Address,
    pub identity: ModuleIdentity,
    /// Silence after which the master counts as disconnected.
    pub timeout_ms: u32,
}

// Builder states
pub struct NeedAddress;
pub struct NeedIdentity {
    address: Address,
}
pub struct Ready {
    address: Address,
    identity: ModuleIdentity,
}

pub struct ModuleConfigBuilder<State> {
    state: State,
    timeout_ms: u32,
}

impl ModuleConfig {
    pub const DEFAULT_TIMEOUT_MS: u32 = 1000;
}

impl Default for ModuleConfigBuilder<NeedAddress> {
    fn default() -> Self {
        Self::new()
    }
}

// Start the builder
impl ModuleConfigBuilder<NeedAddress> {
    pub fn new() -> Self {
        ModuleConfigBuilder {
            state: NeedAddress,
            timeout_ms: ModuleConfig::DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn address(self, address: Address) -> ModuleConfigBuilder<NeedIdentity> {
        ModuleConfigBuilder {
            state: NeedIdentity { address },
            timeout_ms: self.timeout_ms,
        }
    }
}

// Set identity
impl ModuleConfigBuilder<NeedIdentity> {
    pub fn identity(self, identity: ModuleIdentity) -> ModuleConfigBuilder<Ready> {
        ModuleConfigBuilder {
            state: Ready {
                address: self.state.address,
                identity,
            },
            timeout_ms: self.timeout_ms,
        }
    }
}

// Optional settings and build
impl ModuleConfigBuilder<Ready> {
    pub fn timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn build(self) -> ModuleConfig {
        ModuleConfig {
            address: self.state.address,
            identity: self.state.identity,
            timeout_ms: self.timeout_ms,
        }
    }
}
