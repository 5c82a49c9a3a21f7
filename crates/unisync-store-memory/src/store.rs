//! In-memory entity stores.
//!
//! [`MemoryStore`] implements the person, enrollment, product and cohort
//! contracts over hash maps behind one `RwLock`, enforcing the same
//! uniqueness constraints a relational store would: one person per
//! normalized email, one enrollment per (person, product).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use unisync_core::{
    Cohort, CohortId, CohortRepository, Deactivation, Enrollment, EnrollmentId, EnrollmentPatch,
    EnrollmentRepository, EnrollmentStatus, InactiveReason, NewEnrollment, NewPerson, Person,
    PersonId, PersonPatch, PersonRepository, PersonStatus, PlatformKind, Product,
    ProductRepository, RepositoryError, RepositoryResult,
};

#[derive(Default)]
struct State {
    persons: HashMap<PersonId, Person>,
    email_index: HashMap<String, PersonId>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    products: Vec<Product>,
    cohorts: HashMap<CohortId, Cohort>,
    cohort_index: HashMap<(PlatformKind, String), CohortId>,
}

/// In-memory store implementing every entity contract.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog product.
    pub async fn seed_product(&self, product: Product) {
        self.state.write().await.products.push(product);
    }

    /// Fetch a person by normalized email, for assertions.
    pub async fn person_by_email(&self, email: &str) -> Option<Person> {
        let state = self.state.read().await;
        state
            .email_index
            .get(email)
            .and_then(|id| state.persons.get(id))
            .cloned()
    }

    /// All persons, for assertions.
    pub async fn all_persons(&self) -> Vec<Person> {
        self.state.read().await.persons.values().cloned().collect()
    }

    /// All enrollments of a person, for assertions.
    pub async fn enrollments_of(&self, person_id: PersonId) -> Vec<Enrollment> {
        self.state
            .read()
            .await
            .enrollments
            .values()
            .filter(|e| e.person_id == person_id)
            .cloned()
            .collect()
    }

    /// A cohort by platform-native id, for assertions.
    pub async fn cohort_by_external_id(
        &self,
        platform: PlatformKind,
        external_id: &str,
    ) -> Option<Cohort> {
        let state = self.state.read().await;
        state
            .cohort_index
            .get(&(platform, external_id.to_string()))
            .and_then(|id| state.cohorts.get(id))
            .cloned()
    }

    /// Administrative operation: deactivate a person by hand, marking
    /// every enrollment inactive. This is what the renewal state
    /// machine later undoes when a fresh purchase shows up.
    pub async fn deactivate_person_manually(
        &self,
        email: &str,
        deactivated_by: &str,
        reason: &str,
    ) -> RepositoryResult<Person> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let id = *state
            .email_index
            .get(email)
            .ok_or_else(|| RepositoryError::not_found("Person", email))?;

        for enrollment in state.enrollments.values_mut() {
            if enrollment.person_id == id && enrollment.status == EnrollmentStatus::Active {
                enrollment.status = EnrollmentStatus::Inactive;
                enrollment.inactive_reason = Some(InactiveReason::Manual);
                enrollment.updated_at = now;
            }
        }

        let person = state
            .persons
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found("Person", email))?;
        person.status = PersonStatus::Inactive;
        person.deactivation = Deactivation {
            is_manually_deactivated: true,
            deactivated_at: Some(now),
            deactivated_by: Some(deactivated_by.to_string()),
            reason: Some(reason.to_string()),
            reactivated_at: None,
        };
        person.updated_at = now;
        Ok(person.clone())
    }
}

#[async_trait]
impl PersonRepository for MemoryStore {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<Person>> {
        Ok(self.person_by_email(email).await)
    }

    async fn create(&self, new: NewPerson) -> RepositoryResult<Person> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        if state.email_index.contains_key(&new.email) {
            return Err(RepositoryError::conflict(format!(
                "email already taken: {}",
                new.email
            )));
        }

        let person = Person {
            id: PersonId::new(),
            email: new.email.clone(),
            display_name: new.display_name,
            status: PersonStatus::Active,
            platform_links: new.platform_link.into_iter().collect(),
            deactivation: Deactivation::default(),
            created_at: now,
            updated_at: now,
        };
        state.email_index.insert(new.email, person.id);
        state.persons.insert(person.id, person.clone());
        Ok(person)
    }

    async fn update(&self, id: PersonId, patch: PersonPatch) -> RepositoryResult<Person> {
        let mut state = self.state.write().await;
        let person = state
            .persons
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found("Person", id.to_string()))?;
        person.apply_patch(patch, Utc::now());
        Ok(person.clone())
    }

    async fn count(&self) -> RepositoryResult<u64> {
        Ok(self.state.read().await.persons.len() as u64)
    }
}

#[async_trait]
impl EnrollmentRepository for MemoryStore {
    async fn find_by_person_and_product(
        &self,
        person_id: PersonId,
        product_id: unisync_core::ProductId,
    ) -> RepositoryResult<Option<Enrollment>> {
        Ok(self
            .state
            .read()
            .await
            .enrollments
            .values()
            .find(|e| e.person_id == person_id && e.product_id == product_id)
            .cloned())
    }

    async fn find_by_person(&self, person_id: PersonId) -> RepositoryResult<Vec<Enrollment>> {
        Ok(self.enrollments_of(person_id).await)
    }

    async fn create(&self, new: NewEnrollment) -> RepositoryResult<Enrollment> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        if state
            .enrollments
            .values()
            .any(|e| e.person_id == new.person_id && e.product_id == new.product_id)
        {
            return Err(RepositoryError::conflict(format!(
                "enrollment already exists for person {} and product {}",
                new.person_id, new.product_id
            )));
        }

        let enrollment = Enrollment {
            id: EnrollmentId::new(),
            person_id: new.person_id,
            product_id: new.product_id,
            platform: new.platform,
            external_id: new.external_id,
            status: EnrollmentStatus::Active,
            inactive_reason: None,
            enrolled_at: new.enrolled_at,
            progress: Default::default(),
            engagement: Default::default(),
            is_primary: new.is_primary,
            cohort_memberships: vec![],
            created_at: now,
            updated_at: now,
        };
        state.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    async fn update(
        &self,
        id: EnrollmentId,
        patch: EnrollmentPatch,
    ) -> RepositoryResult<Enrollment> {
        let mut state = self.state.write().await;
        let enrollment = state
            .enrollments
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found("Enrollment", id.to_string()))?;
        enrollment.apply_patch(patch, Utc::now());
        Ok(enrollment.clone())
    }

    async fn update_status_by_person(
        &self,
        person_id: PersonId,
        status: EnrollmentStatus,
        reason: Option<InactiveReason>,
    ) -> RepositoryResult<u64> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut touched = 0;

        for enrollment in state.enrollments.values_mut() {
            if enrollment.person_id != person_id || enrollment.status == status {
                continue;
            }
            enrollment.status = status;
            enrollment.inactive_reason = match status {
                EnrollmentStatus::Active => None,
                EnrollmentStatus::Inactive => reason,
            };
            enrollment.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn count_active(&self) -> RepositoryResult<u64> {
        Ok(self
            .state
            .read()
            .await
            .enrollments
            .values()
            .filter(|e| e.is_active())
            .count() as u64)
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn list_active(&self) -> RepositoryResult<Vec<Product>> {
        Ok(self
            .state
            .read()
            .await
            .products
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CohortRepository for MemoryStore {
    async fn find_or_create(
        &self,
        external_id: &str,
        name: &str,
        platform: PlatformKind,
    ) -> RepositoryResult<Cohort> {
        let mut state = self.state.write().await;
        let key = (platform, external_id.to_string());
        if let Some(id) = state.cohort_index.get(&key) {
            let cohort = state
                .cohorts
                .get(id)
                .ok_or_else(|| RepositoryError::not_found("Cohort", external_id))?;
            return Ok(cohort.clone());
        }

        let cohort = Cohort::new(external_id, name, platform);
        state.cohort_index.insert(key, cohort.id);
        state.cohorts.insert(cohort.id, cohort.clone());
        Ok(cohort)
    }

    async fn count_active_members(&self, cohort_id: CohortId) -> RepositoryResult<u32> {
        Ok(self
            .state
            .read()
            .await
            .enrollments
            .values()
            .filter(|e| {
                e.is_active()
                    && e.cohort_memberships
                        .iter()
                        .any(|m| m.cohort_id == cohort_id && m.left_at.is_none())
            })
            .count() as u32)
    }

    async fn set_member_count(&self, cohort_id: CohortId, count: u32) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let cohort = state
            .cohorts
            .get_mut(&cohort_id)
            .ok_or_else(|| RepositoryError::not_found("Cohort", cohort_id.to_string()))?;
        cohort.active_members = count;
        Ok(())
    }

    async fn deactivate(&self, cohort_id: CohortId) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let cohort = state
            .cohorts
            .get_mut(&cohort_id)
            .ok_or_else(|| RepositoryError::not_found("Cohort", cohort_id.to_string()))?;
        cohort.is_active = false;
        cohort.active_members = 0;
        Ok(())
    }
}
