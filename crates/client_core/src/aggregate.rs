//! Category aggregation over the raw challenge list.
//!
//! Reshapes the flat challenge listing into a category-keyed view for
//! display. Aggregation is a pure function of its input; presentation
//! ordering (the lexicographic category sort) is applied separately at
//! render time and is not part of the aggregation contract.

use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    sync::Arc,
};

use shared::{
    domain::ChallengeId,
    protocol::{ChallengeRecord, FlagRecord, ServiceRecord},
};

/// A service annotated with the id of the challenge it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryService {
    pub service: ServiceRecord,
    pub challenge: ChallengeId,
}

/// A flag annotated with the id of the challenge it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFlag {
    pub flag: FlagRecord,
    pub challenge: ChallengeId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryBucket {
    pub services: Vec<CategoryService>,
    pub flags: Vec<CategoryFlag>,
}

impl CategoryBucket {
    /// Services of the same challenge as `flag` within this bucket. A flag
    /// never sees services from another category, even ones owned by its
    /// own challenge.
    pub fn related_services<'a>(
        &'a self,
        flag: &CategoryFlag,
    ) -> impl Iterator<Item = &'a CategoryService> {
        let challenge = flag.challenge;
        self.services
            .iter()
            .filter(move |s| s.challenge == challenge)
    }

    pub fn related_service_names(&self, flag: &CategoryFlag) -> Vec<&str> {
        self.related_services(flag)
            .map(|s| s.service.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryView {
    buckets: HashMap<String, CategoryBucket>,
}

impl CategoryView {
    pub fn bucket(&self, category: &str) -> Option<&CategoryBucket> {
        self.buckets.get(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Category names in the order they are presented: an explicit
    /// lexicographic sort applied at render time.
    pub fn sorted_categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self.categories().collect();
        categories.sort_unstable();
        categories
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// Index every service and flag under its own `category` field, tagging each
/// with its owning challenge id. Buckets are created on first use; a category
/// seen only on a flag (or only on a service) still gets a bucket, and no
/// record is dropped or duplicated.
pub fn build_category_view(challenges: &[ChallengeRecord]) -> CategoryView {
    let mut buckets: HashMap<String, CategoryBucket> = HashMap::new();

    for challenge in challenges {
        for service in &challenge.services {
            buckets
                .entry(service.category.clone())
                .or_default()
                .services
                .push(CategoryService {
                    service: service.clone(),
                    challenge: challenge.id,
                });
        }

        for flag in &challenge.flags {
            buckets
                .entry(flag.category.clone())
                .or_default()
                .flags
                .push(CategoryFlag {
                    flag: flag.clone(),
                    challenge: challenge.id,
                });
        }
    }

    CategoryView { buckets }
}

/// Memoized wrapper around [`build_category_view`], keyed by a hash of the
/// input list so the view is only recomputed when the challenge data changes.
#[derive(Debug, Default)]
pub struct CategoryViewCache {
    fingerprint: Option<u64>,
    view: Arc<CategoryView>,
}

impl CategoryViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_rebuild(&mut self, challenges: &[ChallengeRecord]) -> Arc<CategoryView> {
        let fingerprint = fingerprint_challenges(challenges);
        if self.fingerprint != Some(fingerprint) {
            self.view = Arc::new(build_category_view(challenges));
            self.fingerprint = Some(fingerprint);
        }
        Arc::clone(&self.view)
    }
}

fn fingerprint_challenges(challenges: &[ChallengeRecord]) -> u64 {
    let mut hasher = DefaultHasher::new();
    challenges.hash(&mut hasher);
    hasher.finish()
}

/// Badge text for a flag's point value. Zero is deliberately plural
/// ("0 Points"); only exactly one point is singular.
pub fn points_label(points: i32) -> String {
    if points == 1 {
        "1 Point".to_string()
    } else {
        format!("{points} Points")
    }
}
