//! Wallet address normalization.
//!
//! Wallets hand us SS58 strings, the contract hands us raw 32-byte ids, and
//! anything that went through a JSON round trip shows up as hex in whatever
//! case the sender chose. Every container in this crate is keyed by the
//! canonical `0x` + 64 lowercase hex form produced here.

use crate::error::{ClientError, ClientResult};
use blake2::{Blake2b512, Digest};
use lumio_io::ActorId;

/// Vara network prefix.
pub const DEFAULT_SS58_PREFIX: u16 = 137;

/// Largest prefix the two-byte SS58 form can carry.
pub const MAX_SS58_PREFIX: u16 = 0b0011_1111_1111_1111;

const SS58_CONTEXT: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;
const ACCOUNT_LEN: usize = 32;

/// Decodes any supported representation into an account id.
pub fn parse_account(raw: &str) -> ClientResult<ActorId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidAddress("empty address".into()));
    }
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        return ActorId::from_hex(trimmed)
            .ok_or_else(|| ClientError::InvalidAddress(trimmed.to_string()));
    }
    if trimmed.len() == 64 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return ActorId::from_hex(trimmed)
            .ok_or_else(|| ClientError::InvalidAddress(trimmed.to_string()));
    }
    decode_ss58(trimmed).map(|(account, _)| account)
}

/// Canonical lookup key for any supported representation.
pub fn canonicalize(raw: &str) -> ClientResult<String> {
    parse_account(raw).map(|account| account.to_hex())
}

/// Decodes an SS58 string, returning the account and its network prefix.
pub fn decode_ss58(raw: &str) -> ClientResult<(ActorId, u16)> {
    let invalid = || ClientError::InvalidAddress(raw.to_string());
    let data = bs58::decode(raw).into_vec().map_err(|_| invalid())?;
    if data.len() < 2 {
        return Err(invalid());
    }

    let (prefix_len, prefix) = match data[0] {
        0..=63 => (1, u16::from(data[0])),
        64..=127 => {
            let lower = (data[0] << 2) | (data[1] >> 6);
            let upper = data[1] & 0b0011_1111;
            (2, u16::from(lower) | (u16::from(upper) << 8))
        }
        _ => return Err(invalid()),
    };

    if data.len() != prefix_len + ACCOUNT_LEN + CHECKSUM_LEN {
        return Err(invalid());
    }

    let body_end = prefix_len + ACCOUNT_LEN;
    let checksum = ss58_checksum(&data[..body_end]);
    if checksum[..CHECKSUM_LEN] != data[body_end..] {
        return Err(invalid());
    }

    let mut bytes = [0u8; ACCOUNT_LEN];
    bytes.copy_from_slice(&data[prefix_len..body_end]);
    Ok((ActorId::new(bytes), prefix))
}

/// Encodes an account as SS58 under the given network prefix. Prefixes
/// above [`MAX_SS58_PREFIX`] keep only their low 14 bits; configuration
/// rejects them before they get here.
pub fn encode_ss58(account: &ActorId, prefix: u16) -> String {
    let ident = prefix & MAX_SS58_PREFIX;
    let mut data = match ident {
        0..=63 => vec![ident as u8],
        _ => {
            let first = ((ident & 0b0000_0000_1111_1100) as u8) >> 2;
            let second = ((ident >> 8) as u8) | (((ident & 0b0000_0000_0000_0011) as u8) << 6);
            vec![first | 0b0100_0000, second]
        }
    };
    data.extend_from_slice(account.as_bytes());
    let checksum = ss58_checksum(&data);
    data.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    bs58::encode(data).into_string()
}

fn ss58_checksum(body: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_CONTEXT);
    hasher.update(body);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development account (Alice) under the generic prefix.
    const ALICE_SS58: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const ALICE_HEX: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    #[test]
    fn ss58_and_hex_forms_share_a_canonical_key() {
        let from_ss58 = canonicalize(ALICE_SS58).unwrap();
        let from_hex = canonicalize(ALICE_HEX).unwrap();
        let from_upper = canonicalize(&ALICE_HEX.to_uppercase()).unwrap();
        let from_bare = canonicalize(ALICE_HEX.trim_start_matches("0x")).unwrap();
        assert_eq!(from_ss58, ALICE_HEX);
        assert_eq!(from_hex, ALICE_HEX);
        assert_eq!(from_upper, ALICE_HEX);
        assert_eq!(from_bare, ALICE_HEX);
    }

    #[test]
    fn decode_reports_generic_prefix() {
        let (_, prefix) = decode_ss58(ALICE_SS58).unwrap();
        assert_eq!(prefix, 42);
    }

    #[test]
    fn encode_then_decode_two_byte_prefix() {
        let account = parse_account(ALICE_HEX).unwrap();
        let vara = encode_ss58(&account, DEFAULT_SS58_PREFIX);
        assert_ne!(vara, ALICE_SS58);
        let (decoded, prefix) = decode_ss58(&vara).unwrap();
        assert_eq!(decoded, account);
        assert_eq!(prefix, DEFAULT_SS58_PREFIX);
    }

    #[test]
    fn generic_prefix_encoding_matches_known_address() {
        let account = parse_account(ALICE_HEX).unwrap();
        assert_eq!(encode_ss58(&account, 42), ALICE_SS58);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(canonicalize(""), Err(ClientError::InvalidAddress(_))));
        assert!(matches!(canonicalize("0x1234"), Err(ClientError::InvalidAddress(_))));
        assert!(matches!(
            canonicalize("not an address"),
            Err(ClientError::InvalidAddress(_))
        ));
        // flipped last character breaks the checksum
        let mut tampered = ALICE_SS58.to_string();
        tampered.pop();
        tampered.push('Z');
        assert!(matches!(canonicalize(&tampered), Err(ClientError::InvalidAddress(_))));
    }
}
