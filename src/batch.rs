//! Keyword universe and query batching.
//!
//! The universe is a fixed, ordered list of topic strings. It is split into
//! contiguous groups of at most [`BATCH_SIZE`] keywords, each joined into a
//! single disjunctive search query (`a OR b OR c`). The partition is exact:
//! no overlap, order preserved, only the final batch may be short.

/// Keywords combined per search query.
pub const BATCH_SIZE: usize = 5;

/// The crypto topic universe driving the default batch run.
pub const CRYPTO_KEYWORDS: &[&str] = &[
    "bitcoin", "btc", "ethereum", "eth", "bnb", "binance", "solana", "sol",
    "ripple", "xrp", "cardano", "ada", "dogecoin", "doge", "polkadot", "dot",
    "polygon", "matic", "avalanche", "avax", "litecoin", "ltc", "shiba", "shib",
    "chainlink", "link", "uniswap", "uni", "arbitrum", "arb", "optimism", "op",
    "stellar", "xlm", "tezos", "xtz", "vechain", "vet", "tron", "trx",
    "crypto", "cryptocurrency", "altcoin", "altcoins", "blockchain", "token",
    "tokens", "web3", "defi", "nft", "airdrops", "pump", "dump", "bullish",
    "bearish", "marketcap", "exchange", "hodl", "staking", "mining", "wallet",
    "metamask", "ledger", "binance", "coinbase", "buy crypto", "sell crypto",
    "crypto news", "crypto update", "crypto alert", "degen", "flip", "rugpull",
];

/// An ordered, non-empty set of topic keywords.
#[derive(Debug, Clone)]
pub struct KeywordUniverse {
    keywords: Vec<String>,
}

/// One group of keywords, ready to be issued as a single query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBatch {
    keywords: Vec<String>,
}

impl KeywordUniverse {
    pub fn new(keywords: Vec<String>) -> Self {
        assert!(!keywords.is_empty(), "keyword universe must be non-empty");
        KeywordUniverse { keywords }
    }

    pub fn crypto() -> Self {
        Self::new(CRYPTO_KEYWORDS.iter().map(|s| s.to_string()).collect())
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    /// Partition into batches of at most `batch_size`, preserving order.
    pub fn batches(&self, batch_size: usize) -> Vec<QueryBatch> {
        assert!(batch_size > 0, "batch size must be positive");
        self.keywords
            .chunks(batch_size)
            .map(|chunk| QueryBatch {
                keywords: chunk.to_vec(),
            })
            .collect()
    }
}

impl QueryBatch {
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// The disjunctive search query for this batch.
    pub fn query(&self) -> String {
        self.keywords.join(" OR ")
    }
}
