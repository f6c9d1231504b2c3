//! Remote key/value access for persisted detector state.
//!
//! Thin Redis wrapper shared by the recon-score backend and the baseline
//! mirror. Every call opens a short-lived connection with read/write
//! timeouts and retries transient failures with backoff.

use redis::Commands;

use itd_core::DetectorError;

use crate::util::{with_retry, BACKEND_RETRIES, CALL_TIMEOUT, RETRY_BACKOFF};

/// Persisted state expires from the KV after this many days.
pub const STATE_TTL_DAYS: u64 = 35;

#[derive(Clone)]
pub struct RedisKv {
    client: redis::Client,
    ttl_seconds: u64,
}

impl RedisKv {
    pub fn open(url: &str) -> Result<Self, DetectorError> {
        let client = redis::Client::open(url)
            .map_err(|e| DetectorError::Config(format!("invalid kv url: {}", e)))?;
        Ok(Self {
            client,
            ttl_seconds: STATE_TTL_DAYS * 24 * 60 * 60,
        })
    }

    pub(crate) fn connection(&self) -> Result<redis::Connection, DetectorError> {
        let con = self
            .client
            .get_connection_with_timeout(CALL_TIMEOUT)
            .map_err(transient)?;
        con.set_read_timeout(Some(CALL_TIMEOUT)).map_err(transient)?;
        con.set_write_timeout(Some(CALL_TIMEOUT)).map_err(transient)?;
        Ok(con)
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>, DetectorError> {
        with_retry("kv get", BACKEND_RETRIES, RETRY_BACKOFF, || {
            let mut con = self.connection()?;
            con.get::<_, Option<String>>(key).map_err(transient)
        })
    }

    /// Write with the state TTL attached.
    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), DetectorError> {
        with_retry("kv set", BACKEND_RETRIES, RETRY_BACKOFF, || {
            let mut con = self.connection()?;
            con.set_ex::<_, _, ()>(key, value, self.ttl_seconds)
                .map_err(transient)
        })
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }
}

pub(crate) fn transient(err: redis::RedisError) -> DetectorError {
    DetectorError::BackendTransient(err.to_string())
}
