//! Platform plugins.
//!
//! Each launch venue supplies four pieces behind shared traits: address
//! derivation, instruction building, pool-account decoding, and event
//! parsing. The trading core never branches on the venue; it asks the
//! registry for the handles matching a token's platform tag.

pub mod letsbonk;
pub mod pumpfun;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use crate::chain::SolanaClient;
use crate::curve::{self, PriceSource};
use crate::domain::{Platform, PoolState, TokenInfo};
use crate::error::{CurveError, Result};

/// Platform-specific address derivation.
pub trait AddressProvider: Send + Sync {
    fn platform(&self) -> Platform;

    fn program_id(&self) -> Pubkey;

    /// The pool/curve account that prices the token.
    fn derive_pool_address(&self, mint: &Pubkey) -> Pubkey;

    fn derive_user_token_account(&self, user: &Pubkey, mint: &Pubkey) -> Pubkey;
}

/// Builds the venue's buy/sell instruction bundles.
///
/// `max_quote_in`/`min_quote_out` are lamports; token amounts are raw
/// units. Builders include the idempotent destination-account creation so
/// a trade never fails on a missing ATA.
pub trait InstructionBuilder: Send + Sync {
    fn platform(&self) -> Platform;

    fn build_buy(
        &self,
        token: &TokenInfo,
        user: &Pubkey,
        max_quote_in: u64,
        min_base_out: u64,
    ) -> Result<Vec<Instruction>>;

    fn build_sell(
        &self,
        token: &TokenInfo,
        user: &Pubkey,
        base_in: u64,
        min_quote_out: u64,
    ) -> Result<Vec<Instruction>>;

    /// Writable accounts a buy touches, for fee estimation.
    fn buy_fee_accounts(&self, token: &TokenInfo, user: &Pubkey) -> Vec<Pubkey>;

    /// Writable accounts a sell touches, for fee estimation.
    fn sell_fee_accounts(&self, token: &TokenInfo, user: &Pubkey) -> Vec<Pubkey>;
}

/// Decodes a raw pool account into the shared [`PoolState`].
pub trait PoolCodec: Send + Sync {
    fn platform(&self) -> Platform;

    fn decode_pool_state(&self, data: &[u8]) -> std::result::Result<PoolState, CurveError>;
}

/// Parses token creation events off the venue's feeds.
pub trait EventParser: Send + Sync {
    fn platform(&self) -> Platform;

    /// The program whose logs/blocks this parser monitors.
    fn program_id(&self) -> Pubkey;

    /// Token creation from transaction log lines, if present.
    fn parse_creation_from_logs(&self, logs: &[String], signature: &str) -> Option<TokenInfo>;

    /// Aggregator feed pool tags this parser accepts.
    fn portal_pool_names(&self) -> &'static [&'static str];

    /// Token creation from an aggregator payload, if it belongs to this
    /// platform.
    fn parse_portal_payload(&self, payload: &serde_json::Value) -> Option<TokenInfo>;
}

/// The full set of venue handles the core needs.
#[derive(Clone)]
pub struct PlatformHandles {
    pub addresses: Arc<dyn AddressProvider>,
    pub instructions: Arc<dyn InstructionBuilder>,
    pub codec: Arc<dyn PoolCodec>,
    pub events: Arc<dyn EventParser>,
}

/// Registry keyed by platform tag.
pub fn handles_for(platform: Platform) -> PlatformHandles {
    match platform {
        Platform::PumpFun => PlatformHandles {
            addresses: Arc::new(pumpfun::PumpFunAddressProvider),
            instructions: Arc::new(pumpfun::PumpFunInstructionBuilder),
            codec: Arc::new(pumpfun::PumpFunPoolCodec),
            events: Arc::new(pumpfun::PumpFunEventParser),
        },
        Platform::LetsBonk => PlatformHandles {
            addresses: Arc::new(letsbonk::LetsBonkAddressProvider),
            instructions: Arc::new(letsbonk::LetsBonkInstructionBuilder),
            codec: Arc::new(letsbonk::LetsBonkPoolCodec),
            events: Arc::new(letsbonk::LetsBonkEventParser),
        },
    }
}

/// The pool address a trade should price against: the one reported with
/// the creation event when present, otherwise derived from the mint.
pub fn pool_address(token: &TokenInfo, addresses: &dyn AddressProvider) -> Pubkey {
    match token.platform {
        Platform::PumpFun => token.bonding_curve,
        Platform::LetsBonk => token.pool_state,
    }
    .unwrap_or_else(|| addresses.derive_pool_address(&token.mint))
}

/// Live pool reader: fetch + decode + price.
pub struct PoolReader {
    client: Arc<SolanaClient>,
    codec: Arc<dyn PoolCodec>,
}

impl PoolReader {
    pub fn new(client: Arc<SolanaClient>, codec: Arc<dyn PoolCodec>) -> Self {
        Self { client, codec }
    }
}

#[async_trait]
impl PriceSource for PoolReader {
    async fn unit_price(&self, pool: &Pubkey) -> Result<Decimal> {
        let state = self.pool_state(pool).await?;
        Ok(curve::unit_price(&state)?)
    }

    async fn pool_state(&self, pool: &Pubkey) -> Result<PoolState> {
        let data = self.client.get_account_data(pool).await?;
        Ok(self.codec.decode_pool_state(&data)?)
    }
}

/// Little-endian cursor over raw account/event bytes.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> std::result::Result<&'a [u8], CurveError> {
        if self.pos + len > self.data.len() {
            return Err(CurveError::MalformedAccount(format!(
                "unexpected end of data at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> std::result::Result<(), CurveError> {
        self.take(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> std::result::Result<u8, CurveError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u64(&mut self) -> std::result::Result<u64, CurveError> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_pubkey(&mut self) -> std::result::Result<Pubkey, CurveError> {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(self.take(32)?);
        Ok(Pubkey::new_from_array(bytes))
    }

    /// Borsh string: u32 length prefix + utf8 bytes.
    pub fn read_string(&mut self) -> std::result::Result<String, CurveError> {
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(self.take(4)?);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CurveError::MalformedAccount(format!("invalid utf8 string: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_reader_walks_fields_in_order() {
        let mut data = Vec::new();
        data.extend_from_slice(&7u64.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(b"test");
        data.push(1);

        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u64().unwrap(), 7);
        assert_eq!(reader.read_string().unwrap(), "test");
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn registry_returns_matching_platform() {
        for platform in [Platform::PumpFun, Platform::LetsBonk] {
            let handles = handles_for(platform);
            assert_eq!(handles.addresses.platform(), platform);
            assert_eq!(handles.instructions.platform(), platform);
            assert_eq!(handles.codec.platform(), platform);
            assert_eq!(handles.events.platform(), platform);
        }
    }
}
