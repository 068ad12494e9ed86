use crate::config::SignatureError;
use crate::hash::{ContentHash, SignatureId};

/// Characters that separate tokens in a textual integer signature.
const SEPARATORS: &[char] = &['|', '\t', ',', '{', '}', ' ', '"'];

/// Uniformly weighted set of integer feature ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerSignature {
    id: SignatureId,
    features: Vec<u32>,
}

impl IntegerSignature {
    /// Features are sorted and deduplicated.
    pub fn new(id: SignatureId, mut features: Vec<u32>) -> Self {
        features.sort_unstable();
        features.dedup();
        Self { id, features }
    }

    /// Parse `hash|f1,f2,...` style lines.
    ///
    /// Any of `| \t , { } space "` separates tokens. The first token is the
    /// content hash; the rest are decimal feature ids. Blank lines yield
    /// `Ok(None)`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, SignatureError> {
        let mut tokens = line.split(SEPARATORS).filter(|t| !t.is_empty());
        let Some(hash) = tokens.next() else {
            return Ok(None);
        };
        let hash: ContentHash = hash.parse()?;
        let features = tokens
            .map(|token| {
                token.parse::<u32>().map_err(|_| SignatureError::InvalidFeature {
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Self::new(hash.into(), features)))
    }

    pub fn id(&self) -> SignatureId {
        self.id
    }

    pub fn with_id(mut self, id: SignatureId) -> Self {
        self.id = id;
        self
    }

    pub fn features(&self) -> &[u32] {
        &self.features
    }

    /// Every feature weighs 1.
    pub fn total_weight(&self) -> f32 {
        self.features.len() as f32
    }
}
