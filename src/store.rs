//! Keeping a calibration across power cycles.
//!
//! The driver itself only holds the transform in memory. A [`CalibrationStore`]
//! lets [`Xpt2046::load_calibration`](crate::Xpt2046::load_calibration) and
//! [`Xpt2046::calibration_run_with_store`](crate::Xpt2046::calibration_run_with_store)
//! restore and persist it; [`StorageSlot`] does so on any
//! [`embedded_storage::Storage`] backend (flash, EEPROM, FRAM).

use crate::transform::CalibrationTransform;
use embedded_storage::Storage;

#[cfg(feature = "with_defmt")]
use defmt::Format;

const MAGIC: [u8; 4] = *b"XPTC";
const PAYLOAD: usize = CalibrationTransform::ENCODED_LEN;
const RECORD_LEN: usize = MAGIC.len() + PAYLOAD + 1;

pub trait CalibrationStore {
    type Error;

    /// `Ok(None)` when nothing usable has been stored
    fn load(&mut self) -> Result<Option<CalibrationTransform>, Self::Error>;

    fn save(&mut self, transform: &CalibrationTransform) -> Result<(), Self::Error>;
}

#[cfg_attr(feature = "with_defmt", derive(Format))]
#[derive(Debug)]
pub enum StoreError<E> {
    Storage(E),
    /// The record does not fit between the offset and the end of the storage
    OutOfBounds,
}

/// A fixed-offset record: magic, little-endian transform, XOR checksum
#[derive(Debug)]
pub struct StorageSlot<S> {
    storage: S,
    offset: u32,
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0xA5, |acc, b| acc ^ b)
}

impl<S: Storage> StorageSlot<S> {
    pub fn new(storage: S, offset: u32) -> Self {
        Self { storage, offset }
    }

    pub fn release(self) -> S {
        self.storage
    }

    fn check_bounds(&self) -> Result<(), StoreError<S::Error>> {
        let end = self.offset as usize + RECORD_LEN;
        if end > self.storage.capacity() {
            return Err(StoreError::OutOfBounds);
        }
        Ok(())
    }
}

impl<S: Storage> CalibrationStore for StorageSlot<S> {
    type Error = StoreError<S::Error>;

    fn load(&mut self) -> Result<Option<CalibrationTransform>, Self::Error> {
        self.check_bounds()?;
        let mut record = [0u8; RECORD_LEN];
        self.storage
            .read(self.offset, &mut record)
            .map_err(StoreError::Storage)?;

        let (magic, rest) = record.split_at(MAGIC.len());
        let (payload, sum) = rest.split_at(PAYLOAD);
        if magic != &MAGIC[..] || checksum(payload) != sum[0] {
            debug!("no calibration record at offset {}", self.offset);
            return Ok(None);
        }

        let mut bytes = [0u8; PAYLOAD];
        bytes.copy_from_slice(payload);
        let transform = CalibrationTransform::from_bytes(&bytes);
        Ok(transform.is_valid().then_some(transform))
    }

    fn save(&mut self, transform: &CalibrationTransform) -> Result<(), Self::Error> {
        self.check_bounds()?;
        let payload = transform.to_bytes();
        let mut record = [0u8; RECORD_LEN];
        record[..MAGIC.len()].copy_from_slice(&MAGIC);
        record[MAGIC.len()..MAGIC.len() + PAYLOAD].copy_from_slice(&payload);
        record[RECORD_LEN - 1] = checksum(&payload);
        self.storage
            .write(self.offset, &record)
            .map_err(StoreError::Storage)
    }
}
