//! LetsBonk (Raydium LaunchLab) venue implementation.

use std::time::Instant;

use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_instruction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;

use super::{AddressProvider, ByteReader, EventParser, InstructionBuilder, PoolCodec};
use crate::domain::{Platform, PoolState, TokenInfo};
use crate::error::{CurveError, Result};

mod addresses {
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn program() -> Pubkey {
        Pubkey::from_str("LanMV9sAd7wArD4vJFi2qDdfnVhFxYSUg6eADduJ3uj").unwrap()
    }

    pub fn authority() -> Pubkey {
        Pubkey::from_str("WLHv2UAZm6z4KyaaELi5pjdbJh6RESMva1Rnn8pJVVh").unwrap()
    }

    pub fn global_config() -> Pubkey {
        Pubkey::from_str("6s1xP3hpbAfFoNtUNF8mfHsjr2Bd97JxFJRWLbL6aHuX").unwrap()
    }

    pub fn platform_config() -> Pubkey {
        Pubkey::from_str("FfYek5vEz23cMkWsdJwG2oa6EphsvXSHrGpdALN4g6W1").unwrap()
    }

    pub fn event_authority() -> Pubkey {
        Pubkey::from_str("2DPAtwB8L12vrMRExbLuyGnC7n2J5LNoZQSejeQGpwkr").unwrap()
    }

    pub fn wsol_mint() -> Pubkey {
        Pubkey::from_str("So11111111111111111111111111111111111111112").unwrap()
    }
}

const BUY_EXACT_IN_DISCRIMINATOR: [u8; 8] = [250, 234, 13, 123, 213, 156, 19, 236];
const SELL_EXACT_IN_DISCRIMINATOR: [u8; 8] = [149, 39, 222, 155, 211, 124, 152, 26];

/// Rent-exempt balance for a 165-byte token account.
const TOKEN_ACCOUNT_RENT: u64 = 2_039_280;
const TOKEN_ACCOUNT_SPACE: u64 = 165;

/// No referral share on our trades.
const SHARE_FEE_RATE: u64 = 0;

pub struct LetsBonkAddressProvider;

impl LetsBonkAddressProvider {
    pub fn derive_vault(pool_state: &Pubkey, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[b"pool_vault", pool_state.as_ref(), mint.as_ref()],
            &addresses::program(),
        )
        .0
    }
}

impl AddressProvider for LetsBonkAddressProvider {
    fn platform(&self) -> Platform {
        Platform::LetsBonk
    }

    fn program_id(&self) -> Pubkey {
        addresses::program()
    }

    fn derive_pool_address(&self, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[b"pool", mint.as_ref(), addresses::wsol_mint().as_ref()],
            &addresses::program(),
        )
        .0
    }

    fn derive_user_token_account(&self, user: &Pubkey, mint: &Pubkey) -> Pubkey {
        get_associated_token_address(user, mint)
    }
}

pub struct LetsBonkInstructionBuilder;

struct TradeAccounts {
    pool_state: Pubkey,
    base_vault: Pubkey,
    quote_vault: Pubkey,
    user_base_token: Pubkey,
}

impl LetsBonkInstructionBuilder {
    fn trade_accounts(token: &TokenInfo, user: &Pubkey) -> TradeAccounts {
        let provider = LetsBonkAddressProvider;
        let pool_state = token
            .pool_state
            .unwrap_or_else(|| provider.derive_pool_address(&token.mint));
        let base_vault = token
            .base_vault
            .unwrap_or_else(|| LetsBonkAddressProvider::derive_vault(&pool_state, &token.mint));
        let quote_vault = token.quote_vault.unwrap_or_else(|| {
            LetsBonkAddressProvider::derive_vault(&pool_state, &addresses::wsol_mint())
        });

        TradeAccounts {
            pool_state,
            base_vault,
            quote_vault,
            user_base_token: provider.derive_user_token_account(user, &token.mint),
        }
    }

    /// Transient WSOL account seed, unique per wallet and transaction.
    fn wsol_seed(user: &Pubkey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(std::time::UNIX_EPOCH.elapsed().unwrap_or_default().as_nanos().to_le_bytes());
        hasher.update(user.as_ref());
        let digest = hasher.finalize();
        hex_prefix(&digest, 16)
    }

    /// WSOL wrapper lifecycle: create seeded account, initialize, trade,
    /// close back to the wallet.
    fn wsol_bracket(
        user: &Pubkey,
        seed: &str,
        lamports: u64,
    ) -> Result<(Pubkey, Vec<Instruction>, Instruction)> {
        let wsol_account = Pubkey::create_with_seed(user, seed, &spl_token::id())
            .map_err(|e| crate::error::MinthawkError::Internal(e.to_string()))?;

        let create = system_instruction::create_account_with_seed(
            user,
            &wsol_account,
            user,
            seed,
            lamports,
            TOKEN_ACCOUNT_SPACE,
            &spl_token::id(),
        );
        let initialize = spl_token::instruction::initialize_account(
            &spl_token::id(),
            &wsol_account,
            &addresses::wsol_mint(),
            user,
        )
        .map_err(|e| crate::error::MinthawkError::Internal(e.to_string()))?;
        let close = spl_token::instruction::close_account(
            &spl_token::id(),
            &wsol_account,
            user,
            user,
            &[],
        )
        .map_err(|e| crate::error::MinthawkError::Internal(e.to_string()))?;

        Ok((wsol_account, vec![create, initialize], close))
    }

    fn swap_metas(
        accounts: &TradeAccounts,
        user: &Pubkey,
        wsol_account: &Pubkey,
        mint: &Pubkey,
    ) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(addresses::authority(), false),
            AccountMeta::new_readonly(addresses::global_config(), false),
            AccountMeta::new_readonly(addresses::platform_config(), false),
            AccountMeta::new(accounts.pool_state, false),
            AccountMeta::new(accounts.user_base_token, false),
            AccountMeta::new(*wsol_account, false),
            AccountMeta::new(accounts.base_vault, false),
            AccountMeta::new(accounts.quote_vault, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(addresses::wsol_mint(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(addresses::event_authority(), false),
            AccountMeta::new_readonly(addresses::program(), false),
        ]
    }

    fn swap_data(discriminator: [u8; 8], amount_in: u64, minimum_amount_out: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(32);
        data.extend_from_slice(&discriminator);
        data.extend_from_slice(&amount_in.to_le_bytes());
        data.extend_from_slice(&minimum_amount_out.to_le_bytes());
        data.extend_from_slice(&SHARE_FEE_RATE.to_le_bytes());
        data
    }
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= len {
            break;
        }
    }
    out.truncate(len);
    out
}

impl InstructionBuilder for LetsBonkInstructionBuilder {
    fn platform(&self) -> Platform {
        Platform::LetsBonk
    }

    fn build_buy(
        &self,
        token: &TokenInfo,
        user: &Pubkey,
        max_quote_in: u64,
        min_base_out: u64,
    ) -> Result<Vec<Instruction>> {
        let accounts = Self::trade_accounts(token, user);
        let seed = Self::wsol_seed(user);

        let create_ata =
            create_associated_token_account_idempotent(user, user, &token.mint, &spl_token::id());

        // The wrapper is funded with rent plus everything we may spend.
        let (wsol_account, wsol_setup, wsol_close) =
            Self::wsol_bracket(user, &seed, max_quote_in + TOKEN_ACCOUNT_RENT)?;

        let swap = Instruction {
            program_id: addresses::program(),
            accounts: Self::swap_metas(&accounts, user, &wsol_account, &token.mint),
            data: Self::swap_data(BUY_EXACT_IN_DISCRIMINATOR, max_quote_in, min_base_out),
        };

        let mut instructions = vec![create_ata];
        instructions.extend(wsol_setup);
        instructions.push(swap);
        instructions.push(wsol_close);
        Ok(instructions)
    }

    fn build_sell(
        &self,
        token: &TokenInfo,
        user: &Pubkey,
        base_in: u64,
        min_quote_out: u64,
    ) -> Result<Vec<Instruction>> {
        let accounts = Self::trade_accounts(token, user);
        let seed = Self::wsol_seed(user);

        let (wsol_account, wsol_setup, wsol_close) =
            Self::wsol_bracket(user, &seed, TOKEN_ACCOUNT_RENT)?;

        let swap = Instruction {
            program_id: addresses::program(),
            accounts: Self::swap_metas(&accounts, user, &wsol_account, &token.mint),
            data: Self::swap_data(SELL_EXACT_IN_DISCRIMINATOR, base_in, min_quote_out),
        };

        let mut instructions = wsol_setup;
        instructions.push(swap);
        instructions.push(wsol_close);
        Ok(instructions)
    }

    fn buy_fee_accounts(&self, token: &TokenInfo, user: &Pubkey) -> Vec<Pubkey> {
        let accounts = Self::trade_accounts(token, user);
        vec![
            accounts.pool_state,
            accounts.base_vault,
            accounts.quote_vault,
            token.mint,
            addresses::program(),
        ]
    }

    fn sell_fee_accounts(&self, token: &TokenInfo, user: &Pubkey) -> Vec<Pubkey> {
        self.buy_fee_accounts(token, user)
    }
}

pub struct LetsBonkPoolCodec;

impl PoolCodec for LetsBonkPoolCodec {
    fn platform(&self) -> Platform {
        Platform::LetsBonk
    }

    /// LaunchLab pool state: fixed-width header, reserve block, then the
    /// config/mint/vault/creator pubkeys.
    fn decode_pool_state(&self, data: &[u8]) -> std::result::Result<PoolState, CurveError> {
        if data.len() < 8 {
            return Err(CurveError::MalformedAccount(
                "pool state account too short".to_string(),
            ));
        }

        let mut reader = ByteReader::new(&data[8..]);
        reader.skip(8)?; // epoch
        reader.skip(1)?; // auth_bump
        let status = reader.read_u8()?;
        reader.skip(1)?; // base_decimals
        reader.skip(1)?; // quote_decimals
        reader.skip(1)?; // migrate_type

        let supply = reader.read_u64()?;
        reader.skip(8)?; // total_base_sell
        let virtual_base = reader.read_u64()?;
        let virtual_quote = reader.read_u64()?;
        let real_base = reader.read_u64()?;
        let real_quote = reader.read_u64()?;
        reader.skip(8 * 4)?; // fund raising target + fee accumulators
        reader.skip(8 * 5)?; // vesting schedule

        reader.skip(32 * 2)?; // global_config, platform_config
        reader.skip(32 * 4)?; // base_mint, quote_mint, base_vault, quote_vault
        let creator = reader.read_pubkey()?;

        Ok(PoolState {
            virtual_base_reserve: virtual_base,
            virtual_quote_reserve: virtual_quote,
            real_base_reserve: real_base,
            real_quote_reserve: real_quote,
            total_supply: supply,
            // status 0 = funding; anything else has migrated or is migrating
            complete: status != 0,
            creator,
        })
    }
}

pub struct LetsBonkEventParser;

impl EventParser for LetsBonkEventParser {
    fn platform(&self) -> Platform {
        Platform::LetsBonk
    }

    fn program_id(&self) -> Pubkey {
        addresses::program()
    }

    fn parse_creation_from_logs(&self, _logs: &[String], _signature: &str) -> Option<TokenInfo> {
        // LaunchLab pool initializations do not surface a parseable event
        // in plain log subscriptions; block and aggregator feeds carry them.
        None
    }

    fn portal_pool_names(&self) -> &'static [&'static str] {
        &["bonk"]
    }

    fn parse_portal_payload(&self, payload: &serde_json::Value) -> Option<TokenInfo> {
        use std::str::FromStr;

        let mint = Pubkey::from_str(payload.get("mint")?.as_str()?).ok()?;
        let provider = LetsBonkAddressProvider;
        let pool_state = payload
            .get("poolAddress")
            .and_then(|v| v.as_str())
            .and_then(|s| Pubkey::from_str(s).ok())
            .unwrap_or_else(|| provider.derive_pool_address(&mint));
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
            platform: Platform::LetsBonk,
            bonding_curve: None,
            associated_bonding_curve: None,
            pool_state: Some(pool_state),
            base_vault: Some(LetsBonkAddressProvider::derive_vault(&pool_state, &mint)),
            quote_vault: Some(LetsBonkAddressProvider::derive_vault(
                &pool_state,
                &addresses::wsol_mint(),
            )),
            user: creator,
            creator,
            creator_vault: None,
            discovered_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> TokenInfo {
        let payload = serde_json::json!({
            "mint": Pubkey::new_unique().to_string(),
            "name": "Bonk Thing",
            "symbol": "BNKT",
            "uri": "https://example.com/bonk.json",
            "traderPublicKey": Pubkey::new_unique().to_string(),
            "pool": "bonk",
        });
        LetsBonkEventParser.parse_portal_payload(&payload).unwrap()
    }

    #[test]
    fn portal_payload_derives_pool_and_vaults() {
        let token = token();
        assert_eq!(token.platform, Platform::LetsBonk);
        assert!(token.pool_state.is_some());
        assert!(token.base_vault.is_some());
        assert!(token.quote_vault.is_some());
        assert_eq!(
            token.pool_state.unwrap(),
            LetsBonkAddressProvider.derive_pool_address(&token.mint)
        );
    }

    #[test]
    fn buy_wraps_sol_around_the_swap() {
        let token = token();
        let user = Pubkey::new_unique();
        let instructions = LetsBonkInstructionBuilder
            .build_buy(&token, &user, 10_000_000, 1_000)
            .unwrap();

        // ata create, wsol create, wsol init, swap, wsol close
        assert_eq!(instructions.len(), 5);
        let swap = &instructions[3];
        assert_eq!(swap.program_id, addresses::program());
        assert_eq!(&swap.data[..8], &BUY_EXACT_IN_DISCRIMINATOR);
        assert_eq!(&swap.data[8..16], &10_000_000u64.to_le_bytes());
        assert_eq!(&swap.data[16..24], &1_000u64.to_le_bytes());
        // trailing share fee rate
        assert_eq!(&swap.data[24..32], &0u64.to_le_bytes());
    }

    #[test]
    fn sell_has_no_ata_creation() {
        let token = token();
        let user = Pubkey::new_unique();
        let instructions = LetsBonkInstructionBuilder
            .build_sell(&token, &user, 5_000, 100)
            .unwrap();
        assert_eq!(instructions.len(), 4);
        assert_eq!(&instructions[2].data[..8], &SELL_EXACT_IN_DISCRIMINATOR);
    }

    #[test]
    fn decodes_pool_state_reserve_block() {
        let mut data = vec![0u8; 8]; // discriminator (unchecked)
        data.extend_from_slice(&1u64.to_le_bytes()); // epoch
        data.push(255); // auth_bump
        data.push(0); // status = funding
        data.push(6); // base_decimals
        data.push(9); // quote_decimals
        data.push(0); // migrate_type
        data.extend_from_slice(&1_000_000u64.to_le_bytes()); // supply
        data.extend_from_slice(&0u64.to_le_bytes()); // total_base_sell
        data.extend_from_slice(&500u64.to_le_bytes()); // virtual_base
        data.extend_from_slice(&600u64.to_le_bytes()); // virtual_quote
        data.extend_from_slice(&50u64.to_le_bytes()); // real_base
        data.extend_from_slice(&60u64.to_le_bytes()); // real_quote
        data.extend_from_slice(&[0u8; 8 * 4]); // fund raising + fees
        data.extend_from_slice(&[0u8; 8 * 5]); // vesting
        data.extend_from_slice(&[0u8; 32 * 6]); // configs, mints, vaults
        let creator = Pubkey::new_unique();
        data.extend_from_slice(creator.as_ref());

        let state = LetsBonkPoolCodec.decode_pool_state(&data).unwrap();
        assert_eq!(state.virtual_base_reserve, 500);
        assert_eq!(state.virtual_quote_reserve, 600);
        assert_eq!(state.total_supply, 1_000_000);
        assert_eq!(state.creator, creator);
        assert!(!state.complete);
    }
}
