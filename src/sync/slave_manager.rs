use crate::{
    Error,
    bus::{BusSlave, SlavePort},
    module::metadata::{IDENTITY_LEN, RESPONSE_PREFIX},
    sync::MirrorBuffer,
};

/// Peripheral side of the register protocol.
///
/// Serves a [`MirrorBuffer`] through a [`BusSlave`] register image. Each
/// tick folds master writes into the mirror, restores the identity block
/// and republishes the mirror. Nothing is scheduled: the master drives every
/// transfer.
pub struct SlaveBufferManager<'s, P: SlavePort, const N: usize, const B: usize> {
    slave: &'s BusSlave<P, N>,
    mirror: MirrorBuffer<B>,
    identity: [u8; IDENTITY_LEN],
    timeout_ms: u32,
    last_seen: Option<u32>,
    connected: bool,
}

impl<'s, P: SlavePort, const N: usize, const B: usize> SlaveBufferManager<'s, P, N, B> {
    pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

    /// Publishes `mirror` on `slave` with `identity` at offset 0.
    pub fn new(
        slave: &'s BusSlave<P, N>,
        identity: [u8; IDENTITY_LEN],
        mut mirror: MirrorBuffer<B>,
    ) -> Result<Self, Error> {
        mirror.write(0, &identity)?;
        slave.set_register_image(&[RESPONSE_PREFIX], mirror.as_slice())?;
        // Register address byte plus the whole mirror.
        slave.set_receive_buffer((mirror.len() + 1).min(N))?;
        Ok(Self {
            slave,
            mirror,
            identity,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            last_seen: None,
            connected: false,
        })
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Exchanges state with the bus slave.
    pub fn tick(&mut self, now_ms: u32) -> Result<(), Error> {
        if self.slave.take_event().is_some() {
            self.last_seen = Some(now_ms);
        }
        let connected = self.connected(now_ms);
        if connected != self.connected {
            self.connected = connected;
            if connected {
                log::info!("master connected");
            } else {
                log::warn!("master silent for {} ms", self.timeout_ms);
            }
        }

        let mirror = &mut self.mirror;
        let identity = &self.identity;
        self.slave.with_image(|image| {
            if let Some((start, end)) = image.take_written() {
                if let Some(written) = image.body().get(start..end) {
                    if mirror.write(start, written).is_err() {
                        log::warn!("dropped master write {}..{}", start, end);
                    }
                }
            }
            mirror.write(0, identity)?;
            let len = mirror.len().min(image.body().len());
            image.body_mut()[..len].copy_from_slice(&mirror.as_slice()[..len]);
            Ok(())
        })?
    }

    /// True while the last completed transaction is younger than the timeout.
    pub fn connected(&self, now_ms: u32) -> bool {
        self.last_seen
            .is_some_and(|seen| now_ms.wrapping_sub(seen) < self.timeout_ms)
    }

    pub fn mirror(&self) -> &MirrorBuffer<B> {
        &self.mirror
    }

    /// Local changes are published on the next tick.
    pub fn mirror_mut(&mut self) -> &mut MirrorBuffer<B> {
        &mut self.mirror
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        self.mirror.write(offset, data)
    }
}
