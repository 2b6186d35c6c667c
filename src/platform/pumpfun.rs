//! pump.fun venue implementation.

use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tracing::debug;

use super::{AddressProvider, ByteReader, EventParser, InstructionBuilder, PoolCodec};
use crate::domain::{Platform, PoolState, TokenInfo};
use crate::error::{CurveError, MinthawkError, Result};

mod addresses {
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn program() -> Pubkey {
        Pubkey::from_str("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P").unwrap()
    }

    pub fn global() -> Pubkey {
        Pubkey::from_str("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf").unwrap()
    }

    pub fn fee_recipient() -> Pubkey {
        Pubkey::from_str("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM").unwrap()
    }

    pub fn event_authority() -> Pubkey {
        Pubkey::from_str("Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1").unwrap()
    }

    pub fn system_program() -> Pubkey {
        Pubkey::from_str("11111111111111111111111111111111").unwrap()
    }
}

/// Anchor instruction discriminators from the pump.fun IDL.
const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

/// Account discriminator of the bonding curve state.
const CURVE_DISCRIMINATOR: [u8; 8] = 6966180631402821399u64.to_le_bytes();

/// Event discriminator of CreateEvent in program logs.
const CREATE_EVENT_DISCRIMINATOR: [u8; 8] = [27, 114, 169, 77, 222, 235, 99, 118];

pub struct PumpFunAddressProvider;

impl PumpFunAddressProvider {
    pub fn derive_creator_vault(creator: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[b"creator-vault", creator.as_ref()],
            &addresses::program(),
        )
        .0
    }

    fn derive_global_volume_accumulator() -> Pubkey {
        Pubkey::find_program_address(&[b"global_volume_accumulator"], &addresses::program()).0
    }

    fn derive_user_volume_accumulator(user: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[b"user_volume_accumulator", user.as_ref()],
            &addresses::program(),
        )
        .0
    }
}

impl AddressProvider for PumpFunAddressProvider {
    fn platform(&self) -> Platform {
        Platform::PumpFun
    }

    fn program_id(&self) -> Pubkey {
        addresses::program()
    }

    fn derive_pool_address(&self, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[b"bonding-curve", mint.as_ref()], &addresses::program()).0
    }

    fn derive_user_token_account(&self, user: &Pubkey, mint: &Pubkey) -> Pubkey {
        get_associated_token_address(user, mint)
    }
}

pub struct PumpFunInstructionBuilder;

impl PumpFunInstructionBuilder {
    fn trade_accounts(token: &TokenInfo, user: &Pubkey) -> Result<TradeAccounts> {
        let provider = PumpFunAddressProvider;
        let bonding_curve = token
            .bonding_curve
            .unwrap_or_else(|| provider.derive_pool_address(&token.mint));
        let associated_bonding_curve = token
            .associated_bonding_curve
            .unwrap_or_else(|| get_associated_token_address(&bonding_curve, &token.mint));
        let creator = token.creator.ok_or_else(|| {
            MinthawkError::Internal(format!("token {} has no creator recorded", token.mint))
        })?;
        let creator_vault = token
            .creator_vault
            .unwrap_or_else(|| PumpFunAddressProvider::derive_creator_vault(&creator));

        Ok(TradeAccounts {
            bonding_curve,
            associated_bonding_curve,
            creator_vault,
            user_ata: provider.derive_user_token_account(user, &token.mint),
        })
    }
}

struct TradeAccounts {
    bonding_curve: Pubkey,
    associated_bonding_curve: Pubkey,
    creator_vault: Pubkey,
    user_ata: Pubkey,
}

impl InstructionBuilder for PumpFunInstructionBuilder {
    fn platform(&self) -> Platform {
        Platform::PumpFun
    }

    fn build_buy(
        &self,
        token: &TokenInfo,
        user: &Pubkey,
        max_quote_in: u64,
        min_base_out: u64,
    ) -> Result<Vec<Instruction>> {
        let accounts = Self::trade_accounts(token, user)?;

        let create_ata =
            create_associated_token_account_idempotent(user, user, &token.mint, &spl_token::id());

        let metas = vec![
            AccountMeta::new_readonly(addresses::global(), false),
            AccountMeta::new(addresses::fee_recipient(), false),
            AccountMeta::new_readonly(token.mint, false),
            AccountMeta::new(accounts.bonding_curve, false),
            AccountMeta::new(accounts.associated_bonding_curve, false),
            AccountMeta::new(accounts.user_ata, false),
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(addresses::system_program(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new(accounts.creator_vault, false),
            AccountMeta::new_readonly(addresses::event_authority(), false),
            AccountMeta::new_readonly(addresses::program(), false),
            AccountMeta::new(
                PumpFunAddressProvider::derive_global_volume_accumulator(),
                false,
            ),
            AccountMeta::new(
                PumpFunAddressProvider::derive_user_volume_accumulator(user),
                false,
            ),
        ];

        // buy(amount: tokens out, max_sol_cost: lamports cap)
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&BUY_DISCRIMINATOR);
        data.extend_from_slice(&min_base_out.to_le_bytes());
        data.extend_from_slice(&max_quote_in.to_le_bytes());

        let buy = Instruction {
            program_id: addresses::program(),
            accounts: metas,
            data,
        };

        Ok(vec![create_ata, buy])
    }

    fn build_sell(
        &self,
        token: &TokenInfo,
        user: &Pubkey,
        base_in: u64,
        min_quote_out: u64,
    ) -> Result<Vec<Instruction>> {
        let accounts = Self::trade_accounts(token, user)?;

        let metas = vec![
            AccountMeta::new_readonly(addresses::global(), false),
            AccountMeta::new(addresses::fee_recipient(), false),
            AccountMeta::new_readonly(token.mint, false),
            AccountMeta::new(accounts.bonding_curve, false),
            AccountMeta::new(accounts.associated_bonding_curve, false),
            AccountMeta::new(accounts.user_ata, false),
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(addresses::system_program(), false),
            AccountMeta::new(accounts.creator_vault, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(addresses::event_authority(), false),
            AccountMeta::new_readonly(addresses::program(), false),
        ];

        // sell(amount: tokens in, min_sol_output: lamports floor)
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&SELL_DISCRIMINATOR);
        data.extend_from_slice(&base_in.to_le_bytes());
        data.extend_from_slice(&min_quote_out.to_le_bytes());

        Ok(vec![Instruction {
            program_id: addresses::program(),
            accounts: metas,
            data,
        }])
    }

    fn buy_fee_accounts(&self, token: &TokenInfo, user: &Pubkey) -> Vec<Pubkey> {
        match Self::trade_accounts(token, user) {
            Ok(accounts) => vec![
                token.mint,
                accounts.bonding_curve,
                addresses::program(),
                addresses::fee_recipient(),
            ],
            Err(_) => vec![token.mint, addresses::program()],
        }
    }

    fn sell_fee_accounts(&self, token: &TokenInfo, user: &Pubkey) -> Vec<Pubkey> {
        self.buy_fee_accounts(token, user)
    }
}

pub struct PumpFunPoolCodec;

impl PoolCodec for PumpFunPoolCodec {
    fn platform(&self) -> Platform {
        Platform::PumpFun
    }

    fn decode_pool_state(&self, data: &[u8]) -> std::result::Result<PoolState, CurveError> {
        if data.len() < 8 || data[..8] != CURVE_DISCRIMINATOR {
            return Err(CurveError::MalformedAccount(
                "invalid curve state discriminator".to_string(),
            ));
        }

        let mut reader = ByteReader::new(&data[8..]);
        let virtual_base_reserve = reader.read_u64()?;
        let virtual_quote_reserve = reader.read_u64()?;
        let real_base_reserve = reader.read_u64()?;
        let real_quote_reserve = reader.read_u64()?;
        let total_supply = reader.read_u64()?;
        let complete = reader.read_u8()? != 0;
        let creator = reader.read_pubkey()?;

        Ok(PoolState {
            virtual_base_reserve,
            virtual_quote_reserve,
            real_base_reserve,
            real_quote_reserve,
            total_supply,
            complete,
            creator,
        })
    }
}

pub struct PumpFunEventParser;

impl PumpFunEventParser {
    /// Decode a CreateEvent payload (discriminator already verified).
    fn decode_create_event(payload: &[u8]) -> Option<TokenInfo> {
        let mut reader = ByteReader::new(payload);
        let name = reader.read_string().ok()?;
        let symbol = reader.read_string().ok()?;
        let uri = reader.read_string().ok()?;
        let mint = reader.read_pubkey().ok()?;
        let bonding_curve = reader.read_pubkey().ok()?;
        let user = reader.read_pubkey().ok()?;
        let creator = reader.read_pubkey().ok().or(Some(user))?;

        Some(TokenInfo {
            name,
            symbol,
            uri,
            mint,
            platform: Platform::PumpFun,
            bonding_curve: Some(bonding_curve),
            associated_bonding_curve: Some(get_associated_token_address(&bonding_curve, &mint)),
            pool_state: None,
            base_vault: None,
            quote_vault: None,
            user: Some(user),
            creator: Some(creator),
            creator_vault: Some(PumpFunAddressProvider::derive_creator_vault(&creator)),
            discovered_at: Instant::now(),
        })
    }
}

impl EventParser for PumpFunEventParser {
    fn platform(&self) -> Platform {
        Platform::PumpFun
    }

    fn program_id(&self) -> Pubkey {
        addresses::program()
    }

    fn parse_creation_from_logs(&self, logs: &[String], signature: &str) -> Option<TokenInfo> {
        if !logs
            .iter()
            .any(|log| log.contains("Program log: Instruction: Create"))
        {
            return None;
        }
        // The Create discriminator also prefixes CreateTokenAccount swaps.
        if logs
            .iter()
            .any(|log| log.contains("Program log: Instruction: CreateTokenAccount"))
        {
            return None;
        }

        for log in logs {
            let Some(encoded) = log.strip_prefix("Program data: ") else {
                continue;
            };
            let Ok(bytes) = BASE64.decode(encoded.trim()) else {
                continue;
            };
            if bytes.len() < 8 || bytes[..8] != CREATE_EVENT_DISCRIMINATOR {
                continue;
            }
            if let Some(token) = Self::decode_create_event(&bytes[8..]) {
                debug!(signature, mint = %token.mint, "parsed pump.fun CreateEvent");
                return Some(token);
            }
        }

        None
    }

    fn portal_pool_names(&self) -> &'static [&'static str] {
        &["pump"]
    }

    fn parse_portal_payload(&self, payload: &serde_json::Value) -> Option<TokenInfo> {
        use std::str::FromStr;

        let mint = Pubkey::from_str(payload.get("mint")?.as_str()?).ok()?;
        let bonding_curve = payload
            .get("bondingCurveKey")
            .and_then(|v| v.as_str())
            .and_then(|s| Pubkey::from_str(s).ok());
        let creator = payload
            .get("traderPublicKey")
            .and_then(|v| v.as_str())
            .and_then(|s| Pubkey::from_str(s).ok());

        Some(TokenInfo {
            name: payload
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            symbol: payload
                .get("symbol")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            uri: payload
                .get("uri")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            mint,
            platform: Platform::PumpFun,
            bonding_curve,
            associated_bonding_curve: bonding_curve
                .map(|curve| get_associated_token_address(&curve, &mint)),
            pool_state: None,
            base_vault: None,
            quote_vault: None,
            user: creator,
            creator,
            creator_vault: creator
                .map(|c| PumpFunAddressProvider::derive_creator_vault(&c)),
            discovered_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_create_event() -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&CREATE_EVENT_DISCRIMINATOR);
        for s in ["My Token", "MYT", "https://example.com/meta.json"] {
            payload.extend_from_slice(&(s.len() as u32).to_le_bytes());
            payload.extend_from_slice(s.as_bytes());
        }
        // mint, bonding_curve, user, creator
        for _ in 0..4 {
            payload.extend_from_slice(Pubkey::new_unique().as_ref());
        }
        payload
    }

    #[test]
    fn decodes_curve_account() {
        let mut data = Vec::new();
        data.extend_from_slice(&CURVE_DISCRIMINATOR);
        for value in [1_000u64, 2_000, 3_000, 4_000, 5_000] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        data.push(0);
        data.extend_from_slice(Pubkey::new_unique().as_ref());

        let state = PumpFunPoolCodec.decode_pool_state(&data).unwrap();
        assert_eq!(state.virtual_base_reserve, 1_000);
        assert_eq!(state.virtual_quote_reserve, 2_000);
        assert_eq!(state.total_supply, 5_000);
        assert!(!state.complete);
    }

    #[test]
    fn rejects_wrong_discriminator() {
        let data = vec![0u8; 100];
        assert!(matches!(
            PumpFunPoolCodec.decode_pool_state(&data),
            Err(CurveError::MalformedAccount(_))
        ));
    }

    #[test]
    fn parses_create_event_from_logs() {
        let logs = vec![
            "Program 6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P invoke [1]".to_string(),
            "Program log: Instruction: Create".to_string(),
            format!("Program data: {}", BASE64.encode(sample_create_event())),
        ];

        let token = PumpFunEventParser
            .parse_creation_from_logs(&logs, "sig")
            .unwrap();
        assert_eq!(token.name, "My Token");
        assert_eq!(token.symbol, "MYT");
        assert_eq!(token.platform, Platform::PumpFun);
        assert!(token.bonding_curve.is_some());
        assert!(token.creator_vault.is_some());
    }

    #[test]
    fn ignores_non_creation_logs() {
        let logs = vec!["Program log: Instruction: Buy".to_string()];
        assert!(PumpFunEventParser
            .parse_creation_from_logs(&logs, "sig")
            .is_none());

        // Create discriminator colliding with token-account creation
        let logs = vec![
            "Program log: Instruction: Create".to_string(),
            "Program log: Instruction: CreateTokenAccount".to_string(),
        ];
        assert!(PumpFunEventParser
            .parse_creation_from_logs(&logs, "sig")
            .is_none());
    }

    #[test]
    fn buy_instructions_start_with_idempotent_ata_creation() {
        let token = PumpFunEventParser::decode_create_event(&sample_create_event()[8..]).unwrap();
        let user = Pubkey::new_unique();
        let instructions = PumpFunInstructionBuilder
            .build_buy(&token, &user, 1_000_000, 30_000)
            .unwrap();

        assert_eq!(instructions.len(), 2);
        assert_eq!(
            instructions[0].program_id,
            spl_associated_token_account::id()
        );
        assert_eq!(instructions[1].program_id, addresses::program());
        assert_eq!(&instructions[1].data[..8], &BUY_DISCRIMINATOR);
        assert_eq!(&instructions[1].data[8..16], &30_000u64.to_le_bytes());
        assert_eq!(&instructions[1].data[16..24], &1_000_000u64.to_le_bytes());
    }

    #[test]
    fn pool_address_prefers_event_reported_curve() {
        let token = PumpFunEventParser::decode_create_event(&sample_create_event()[8..]).unwrap();
        let pool = super::super::pool_address(&token, &PumpFunAddressProvider);
        assert_eq!(Some(pool), token.bonding_curve);
    }
}
