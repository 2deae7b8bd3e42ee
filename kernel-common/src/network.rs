use serde::{Deserialize, Serialize};

/// One of the four Kaspa network profiles the kernel can target.
///
/// The prefix/endpoint mapping in [`Network::address_prefix`] and
/// [`Network::default_endpoint`] is bit-exact with the network profile table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet10,
    Testnet11,
    Testnet12,
}

impl Network {
    pub fn address_prefix(self) -> &'static str {
        match self {
            Network::Mainnet => "kaspa",
            Network::Testnet10 | Network::Testnet11 | Network::Testnet12 => "kaspatest",
        }
    }

    pub fn kaspa_addresses_prefix(self) -> kaspa_addresses::Prefix {
        match self {
            Network::Mainnet => kaspa_addresses::Prefix::Mainnet,
            Network::Testnet10 | Network::Testnet11 | Network::Testnet12 => {
                kaspa_addresses::Prefix::Testnet
            }
        }
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.kaspa.org",
            Network::Testnet10 => "https://api-tn10.kaspa.org",
            Network::Testnet11 => "https://api-tn11.kaspa.org",
            Network::Testnet12 => "https://api-tn12.kaspa.org",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet10 => "testnet-10",
            Network::Testnet11 => "testnet-11",
            Network::Testnet12 => "testnet-12",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_table_is_bit_exact() {
        assert_eq!(Network::Mainnet.address_prefix(), "kaspa");
        assert_eq!(Network::Mainnet.default_endpoint(), "https://api.kaspa.org");
        assert_eq!(Network::Testnet10.address_prefix(), "kaspatest");
        assert_eq!(Network::Testnet10.default_endpoint(), "https://api-tn10.kaspa.org");
        assert_eq!(Network::Testnet11.default_endpoint(), "https://api-tn11.kaspa.org");
        assert_eq!(Network::Testnet12.default_endpoint(), "https://api-tn12.kaspa.org");
    }
}
