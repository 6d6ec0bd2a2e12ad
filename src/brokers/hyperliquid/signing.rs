//! L1 action signing
//!
//! An action is msgpack-encoded, suffixed with the nonce and vault flag and
//! hashed; the hash becomes the `connectionId` of a phantom `Agent` struct that
//! is signed as EIP-712 typed data under the fixed `Exchange` domain.

use crate::error::{AppError, Result};
use ethers::abi::{encode, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256, U256};
use ethers::utils::keccak256;
use serde::Serialize;

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const AGENT_TYPE: &str = "Agent(string source,bytes32 connectionId)";
const DOMAIN_NAME: &str = "Exchange";
const DOMAIN_VERSION: &str = "1";
const DOMAIN_CHAIN_ID: u64 = 1337;

/// Signature as the venue expects it in the request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireSignature {
    pub r: String,
    pub s: String,
    pub v: u64,
}

impl From<Signature> for WireSignature {
    fn from(sig: Signature) -> Self {
        Self {
            r: u256_to_hex(sig.r),
            s: u256_to_hex(sig.s),
            v: sig.v,
        }
    }
}

pub struct ActionSigner {
    wallet: LocalWallet,
    is_mainnet: bool,
}

impl ActionSigner {
    pub fn new(secret_key: &str, is_mainnet: bool) -> Result<Self> {
        let wallet = secret_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| AppError::Signing(format!("Invalid secret key: {}", e)))?;
        Ok(Self { wallet, is_mainnet })
    }

    /// Address of the signing key (may be an API wallet rather than the account)
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Hash of `msgpack(action) || nonce_be || 0x00` (no vault)
    pub fn action_hash<A: Serialize>(action: &A, nonce: u64) -> Result<H256> {
        let mut bytes = rmp_serde::to_vec_named(action)
            .map_err(|e| AppError::Signing(format!("Failed to encode action: {}", e)))?;
        bytes.extend_from_slice(&nonce.to_be_bytes());
        bytes.push(0x00);
        Ok(H256::from(keccak256(bytes)))
    }

    /// EIP-712 digest of the phantom agent for a given connection id
    pub fn agent_digest(&self, connection_id: H256) -> H256 {
        let source = if self.is_mainnet { "a" } else { "b" };

        let struct_hash = keccak256(encode(&[
            Token::FixedBytes(keccak256(AGENT_TYPE).to_vec()),
            Token::FixedBytes(keccak256(source).to_vec()),
            Token::FixedBytes(connection_id.as_bytes().to_vec()),
        ]));

        let mut payload = Vec::with_capacity(66);
        payload.extend_from_slice(&[0x19, 0x01]);
        payload.extend_from_slice(&domain_separator());
        payload.extend_from_slice(&struct_hash);
        H256::from(keccak256(payload))
    }

    pub fn sign_digest(&self, digest: H256) -> Result<Signature> {
        self.wallet
            .sign_hash(digest)
            .map_err(|e| AppError::Signing(format!("Failed to sign action: {}", e)))
    }

    /// Sign an L1 action for submission at `nonce`
    pub fn sign_l1_action<A: Serialize>(&self, action: &A, nonce: u64) -> Result<WireSignature> {
        let connection_id = Self::action_hash(action, nonce)?;
        let digest = self.agent_digest(connection_id);
        Ok(self.sign_digest(digest)?.into())
    }
}

fn domain_separator() -> [u8; 32] {
    keccak256(encode(&[
        Token::FixedBytes(keccak256(DOMAIN_TYPE).to_vec()),
        Token::FixedBytes(keccak256(DOMAIN_NAME).to_vec()),
        Token::FixedBytes(keccak256(DOMAIN_VERSION).to_vec()),
        Token::Uint(U256::from(DOMAIN_CHAIN_ID)),
        Token::Address(Address::zero()),
    ]))
}

fn u256_to_hex(value: U256) -> String {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    format!("0x{}", hex::encode(buf))
}
