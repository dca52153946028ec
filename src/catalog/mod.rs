//! Static chain/token catalogs per network.
//!
//! A catalog lists, for every bridgeable token, the chains it lives on and
//! which chains can send to each other directly. Catalogs are immutable and
//! validated once when resolved for a network.

use crate::error::{RebalanceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Chain identifier. Declaration order is the key order of every map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Optimism,
    Arbitrum,
    Polygon,
    Xdai,
}

impl Chain {
    pub const ALL: [Chain; 5] = [
        Chain::Ethereum,
        Chain::Optimism,
        Chain::Arbitrum,
        Chain::Polygon,
        Chain::Xdai,
    ];

    /// Lowercase slug used in configuration and bridge APIs.
    pub fn slug(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Optimism => "optimism",
            Chain::Arbitrum => "arbitrum",
            Chain::Polygon => "polygon",
            Chain::Xdai => "xdai",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.slug())
    }
}

impl FromStr for Chain {
    type Err = RebalanceError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        Chain::ALL
            .into_iter()
            .find(|chain| chain.slug() == s)
            .ok_or(RebalanceError::UnknownChain(s))
    }
}

/// Supported network selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Kovan,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Network::Mainnet => "mainnet",
            Network::Kovan => "kovan",
        })
    }
}

impl FromStr for Network {
    type Err = RebalanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "kovan" => Ok(Network::Kovan),
            other => Err(RebalanceError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Direct routes of one token: source chain -> reachable destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenRoutes {
    routes: BTreeMap<Chain, BTreeSet<Chain>>,
}

impl TokenRoutes {
    /// Chains the token is supported on, in key order.
    pub fn chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.routes.keys().copied()
    }

    pub fn destinations(&self, from: Chain) -> impl Iterator<Item = Chain> + '_ {
        self.routes.get(&from).into_iter().flatten().copied()
    }

    pub fn has_route(&self, from: Chain, to: Chain) -> bool {
        self.routes
            .get(&from)
            .is_some_and(|destinations| destinations.contains(&to))
    }
}

/// Immutable token/chain catalog for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    network: Network,
    tokens: BTreeMap<String, TokenRoutes>,
}

impl Catalog {
    /// Empty catalog, filled with [`Catalog::with_token`].
    pub fn new(network: Network) -> Self {
        Self {
            network,
            tokens: BTreeMap::new(),
        }
    }

    /// Resolve and validate the built-in catalog for a network name.
    ///
    /// Unknown names fail here, before any balance is read.
    pub fn for_network(name: &str) -> Result<Self> {
        let network: Network = name.parse()?;
        let catalog = Self::builtin(network);
        catalog.validate()?;
        Ok(catalog)
    }

    /// Built-in catalog of the bridge deployment on `network`.
    pub fn builtin(network: Network) -> Self {
        use Chain::{Optimism, Polygon, Xdai};

        match network {
            Network::Kovan => Self::new(network)
                .with_token("USDC", &[(Xdai, &[Optimism]), (Optimism, &[Xdai])]),
            Network::Mainnet => {
                let stable: &[(Chain, &[Chain])] = &[
                    (Xdai, &[Polygon, Optimism]),
                    (Polygon, &[Xdai, Optimism]),
                    (Optimism, &[Polygon, Xdai]),
                ];
                Self::new(network)
                    .with_token("USDC", stable)
                    .with_token("USDT", stable)
                    .with_token("MATIC", &[(Xdai, &[Polygon]), (Polygon, &[Xdai])])
            }
        }
    }

    /// Add (or replace) a token with its direct routes.
    pub fn with_token(mut self, token: &str, routes: &[(Chain, &[Chain])]) -> Self {
        let routes = routes
            .iter()
            .map(|(from, to)| (*from, to.iter().copied().collect()))
            .collect();
        self.tokens
            .insert(token.to_string(), TokenRoutes { routes });
        self
    }

    /// Reject catalogs the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| RebalanceError::InvalidCatalog {
            network: self.network.to_string(),
            reason,
        };

        if self.tokens.is_empty() {
            return Err(invalid("no tokens".to_string()));
        }

        for (token, routes) in &self.tokens {
            if routes.routes.is_empty() {
                return Err(invalid(format!("{token} has no chains")));
            }
            for (from, destinations) in &routes.routes {
                for to in destinations {
                    if to == from {
                        return Err(invalid(format!("{token} routes {from} to itself")));
                    }
                    if !routes.routes.contains_key(to) {
                        return Err(invalid(format!(
                            "{token} routes {from} -> {to} but is not supported on {to}"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&str, &TokenRoutes)> {
        self.tokens.iter().map(|(token, routes)| (token.as_str(), routes))
    }

    pub fn token(&self, token: &str) -> Option<&TokenRoutes> {
        self.tokens.get(token)
    }

    pub fn has_route(&self, token: &str, from: Chain, to: Chain) -> bool {
        self.token(token)
            .is_some_and(|routes| routes.has_route(from, to))
    }
}
