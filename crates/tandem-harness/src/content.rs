//! Fixed content for simulations.

use tandem_core::{ContentPool, ContentProvider, MIX_CATEGORY};

/// Category every simulated room starts in.
pub const SAMPLE_CATEGORY: &str = "friends";

/// Two small categories plus their mix. Built without validation since the
/// pools are fixed and non-empty.
pub struct SampleContent {
    friends: ContentPool,
    party: ContentPool,
    mix: ContentPool,
}

impl SampleContent {
    /// The sample pools.
    pub fn new() -> Self {
        let pool = |prompts: &[&str], forfeits: &[&str]| {
            ContentPool::new(
                prompts.iter().map(ToString::to_string).collect(),
                forfeits.iter().map(ToString::to_string).collect(),
            )
        };
        let friends = pool(
            &["Most embarrassing moment?", "Last lie you told?", "Secret talent?"],
            &["Sing a chorus", "Ten push-ups"],
        );
        let party = pool(&["Worst date ever?"], &["Dance for thirty seconds"]);
        let mix = ContentPool::new(
            [friends.prompts(), party.prompts()].concat(),
            [friends.forfeits(), party.forfeits()].concat(),
        );
        Self { friends, party, mix }
    }
}

impl Default for SampleContent {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentProvider for SampleContent {
    fn prompts_and_forfeits(&self, category: &str) -> Option<&ContentPool> {
        match category {
            SAMPLE_CATEGORY => Some(&self.friends),
            "party" => Some(&self.party),
            MIX_CATEGORY => Some(&self.mix),
            _ => None,
        }
    }
}
