// Shape checks for payout destinations. The payout provider stays the
// authority on validity; this only rejects values that can never be an address.

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const BECH32_ALPHABET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Legacy (P2PKH/P2SH) or segwit bitcoin address, mainnet or testnet
pub fn is_valid_bitcoin_address(address: &str) -> bool {
    let address = address.trim();
    if address.is_empty() {
        return false;
    }

    let lower = address.to_ascii_lowercase();
    for hrp in ["bc1", "tb1"] {
        if let Some(data) = lower.strip_prefix(hrp) {
            // bech32 forbids mixed case
            let single_case = address == lower || address == address.to_ascii_uppercase();
            return single_case
                && (11..=71).contains(&data.len())
                && data.chars().all(|c| BECH32_ALPHABET.contains(c));
        }
    }

    matches!(address.chars().next(), Some('1' | '3' | 'm' | 'n' | '2'))
        && (25..=35).contains(&address.len())
        && address.chars().all(|c| BASE58_ALPHABET.contains(c))
}
