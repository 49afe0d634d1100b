use uuid::Uuid;

use crate::models::usermodel::User;

/// How a paying user enters the graduatoria.
///
/// The variant is resolved once from the payer's persisted referral state
/// (and a referral applied at checkout), before any rank is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankEntry {
    /// Direct payer without a referrer: goes to the front.
    Organic,
    /// Referred payer: goes to the back, the referrer is owed a commission.
    Referred {
        referrer_id: Uuid,
        /// True when the link comes from the checkout and must be stored now.
        newly_linked: bool,
    },
}

impl RankEntry {
    pub fn referrer_id(&self) -> Option<Uuid> {
        match self {
            RankEntry::Organic => None,
            RankEntry::Referred { referrer_id, .. } => Some(*referrer_id),
        }
    }

    /// Referral link to persist as part of this payment, if any.
    pub fn new_referral_link(&self) -> Option<Uuid> {
        match self {
            RankEntry::Referred {
                referrer_id,
                newly_linked: true,
            } => Some(*referrer_id),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &str {
        match self {
            RankEntry::Organic => "organic",
            RankEntry::Referred { .. } => "referred",
        }
    }
}

/// Decide the entry variant. `checkout_referral` must already be known to
/// exist; a stored referral always wins over the checkout one.
pub fn resolve_entry(payer: &User, checkout_referral: Option<Uuid>) -> RankEntry {
    if let Some(referrer_id) = payer.referral {
        return RankEntry::Referred {
            referrer_id,
            newly_linked: false,
        };
    }

    match checkout_referral {
        Some(referrer_id) if referrer_id != payer.id => RankEntry::Referred {
            referrer_id,
            newly_linked: true,
        },
        _ => RankEntry::Organic,
    }
}

/// Add `delta` to every rank in `from..=to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankShift {
    pub from: i32,
    pub to: i32,
    pub delta: i32,
}

impl RankShift {
    pub fn applies_to(&self, rank: i32) -> bool {
        rank >= self.from && rank <= self.to
    }
}

/// Rank rewrite for one payment: shift the others, then place the payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankPlan {
    pub shift: Option<RankShift>,
    pub new_rank: i32,
}

/// Build the rewrite that keeps ranks dense.
///
/// `current_rank` is the payer's rank (0 if never ranked) and `max_rank` the
/// highest rank in use (0 if nobody is ranked). A payer who is already ranked
/// is lifted out of the sequence first, so renewals never leave a gap.
pub fn plan_reposition(entry: &RankEntry, current_rank: i32, max_rank: i32) -> RankPlan {
    let current_rank = current_rank.max(0);

    match entry {
        RankEntry::Organic => {
            let last_ahead = if current_rank > 0 { current_rank - 1 } else { max_rank };
            RankPlan {
                shift: (last_ahead >= 1).then_some(RankShift {
                    from: 1,
                    to: last_ahead,
                    delta: 1,
                }),
                new_rank: 1,
            }
        }
        RankEntry::Referred { .. } if current_rank > 0 => RankPlan {
            shift: (current_rank < max_rank).then_some(RankShift {
                from: current_rank + 1,
                to: max_rank,
                delta: -1,
            }),
            new_rank: max_rank.max(current_rank),
        },
        RankEntry::Referred { .. } => RankPlan {
            shift: None,
            new_rank: max_rank + 1,
        },
    }
}

/// Ranks in use that break the dense {1..N} sequence: duplicates and holes.
/// Returns an empty list when the sequence is healthy.
pub fn find_rank_anomalies(ranks: &[i32]) -> Vec<i32> {
    let mut ranked: Vec<i32> = ranks.iter().copied().filter(|r| *r > 0).collect();
    ranked.sort_unstable();

    let mut anomalies = Vec::new();
    let mut expected = 1;
    for (i, rank) in ranked.iter().enumerate() {
        if i > 0 && ranked[i - 1] == *rank {
            anomalies.push(*rank);
            continue;
        }
        while expected < *rank {
            anomalies.push(expected);
            expected += 1;
        }
        expected = rank + 1;
    }
    anomalies
}
