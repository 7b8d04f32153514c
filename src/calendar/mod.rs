//! Calendar export and subscription feeds
//!
//! ICS exports per person, per rotation, or program-wide, plus
//! token-authenticated webcal subscriptions. AM blocks run 08:00-12:00 local,
//! PM blocks 13:00-17:00.

pub mod ics;

pub use ics::{IcsBuilder, IcsEvent, TZID};

use crate::domain::{
    Assignment, AssignmentRole, Block, CalendarSubscription, Person, TimeOfDay,
};
use crate::error::{CoreError, CoreResult};
use crate::store::Datastore;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Calendar export service over the persistence port
pub struct CalendarService {
    store: Arc<dyn Datastore>,
}

impl CalendarService {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Local start/end times for a block
    pub fn block_time(block: &Block) -> (NaiveDateTime, NaiveDateTime) {
        let (start_hour, end_hour) = match block.time_of_day {
            TimeOfDay::Am => (8, 12),
            TimeOfDay::Pm => (13, 17),
        };
        let start = block
            .date
            .and_hms_opt(start_hour, 0, 0)
            .unwrap_or_else(|| block.date.and_time(chrono::NaiveTime::MIN));
        let end = block
            .date
            .and_hms_opt(end_hour, 0, 0)
            .unwrap_or_else(|| block.date.and_time(chrono::NaiveTime::MIN));
        (start, end)
    }

    /// ICS feed of one person's assignments in the range
    pub fn generate_ics_for_person(
        &self,
        person_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> CoreResult<String> {
        let person = self
            .store
            .person(person_id)
            .ok_or_else(|| CoreError::NotFound(format!("person {}", person_id)))?;

        let mut builder = IcsBuilder::new();
        for assignment in self.store.assignments_for_person(person_id) {
            let Some(block) = self.store.block(assignment.block_id) else {
                continue;
            };
            if block.date < start_date || block.date > end_date {
                continue;
            }
            builder.add_event(self.event_for(&assignment, &block, &person, false));
        }

        Ok(builder.build(Utc::now().naive_utc()))
    }

    /// ICS feed of everyone assigned to one rotation in the range
    pub fn generate_ics_for_rotation(
        &self,
        rotation_template_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> CoreResult<String> {
        let rotation = self
            .store
            .rotation_template(rotation_template_id)
            .ok_or_else(|| {
                CoreError::NotFound(format!("rotation template {}", rotation_template_id))
            })?;

        let mut builder = IcsBuilder::new();
        for assignment in self.store.assignments_in_range(start_date, end_date) {
            if assignment.rotation_template_id != Some(rotation.id) {
                continue;
            }
            let Some(block) = self.store.block(assignment.block_id) else {
                continue;
            };
            let Some(person) = self.store.person(assignment.person_id) else {
                continue;
            };
            builder.add_event(self.event_for(&assignment, &block, &person, true));
        }

        Ok(builder.build(Utc::now().naive_utc()))
    }

    /// Program-wide ICS feed, optionally filtered to one person
    pub fn generate_ics_all(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        person_filter: Option<Uuid>,
    ) -> CoreResult<String> {
        let mut builder = IcsBuilder::new();
        for assignment in self.store.assignments_in_range(start_date, end_date) {
            if let Some(filter) = person_filter {
                if assignment.person_id != filter {
                    continue;
                }
            }
            let Some(block) = self.store.block(assignment.block_id) else {
                continue;
            };
            let Some(person) = self.store.person(assignment.person_id) else {
                continue;
            };
            builder.add_event(self.event_for(&assignment, &block, &person, true));
        }
        Ok(builder.build(Utc::now().naive_utc()))
    }

    fn event_for(
        &self,
        assignment: &Assignment,
        block: &Block,
        person: &Person,
        include_person: bool,
    ) -> IcsEvent {
        let rotation = assignment
            .rotation_template_id
            .and_then(|id| self.store.rotation_template(id));

        let base_summary = rotation
            .as_ref()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| "Clinical Duty".to_string());
        let mut summary = match assignment.role {
            AssignmentRole::Primary => base_summary,
            AssignmentRole::Supervising => format!("{} (Supervising)", base_summary),
            AssignmentRole::Backup => format!("{} (Backup)", base_summary),
        };
        if include_person {
            summary = format!("{} - {}", summary, person.name);
        }

        let mut description_parts = Vec::new();
        if include_person {
            description_parts.push(person.name.clone());
        }
        if let Some(pgy) = person.pgy_level() {
            description_parts.push(format!("PGY Level: {}", pgy));
        }
        if let Some(notes) = &assignment.notes {
            description_parts.push(notes.clone());
        }

        let (start, end) = Self::block_time(block);
        IcsEvent {
            uid: format!("{}@medshift", assignment.id),
            summary,
            description: if description_parts.is_empty() {
                None
            } else {
                Some(description_parts.join("\n"))
            },
            location: rotation.and_then(|r| r.clinic_location),
            start,
            end,
        }
    }

    /// Create a subscription token for a person's feed
    pub fn create_subscription(
        &self,
        person_id: Uuid,
        label: &str,
        created_by_user_id: Option<Uuid>,
        expires_at: Option<DateTime<Utc>>,
    ) -> CoreResult<CalendarSubscription> {
        if self.store.person(person_id).is_none() {
            return Err(CoreError::NotFound(format!("person {}", person_id)));
        }
        let mut subscription = CalendarSubscription::new(person_id, label);
        subscription.created_by_user_id = created_by_user_id;
        subscription.expires_at = expires_at;
        self.store.insert_subscription(subscription.clone())?;
        info!(person_id = %person_id, "created calendar subscription");
        Ok(subscription)
    }

    /// Resolve a feed token, touching last-access. Revoked, expired, or
    /// unknown tokens fail with an auth error (the HTTP layer maps it to 401).
    pub fn resolve_subscription(&self, token: &str) -> CoreResult<CalendarSubscription> {
        let mut subscription = self
            .store
            .subscription_by_token(token)
            .ok_or(CoreError::SubscriptionUnauthorized)?;
        if !subscription.is_valid_at(Utc::now()) {
            return Err(CoreError::SubscriptionUnauthorized);
        }
        subscription.last_accessed_at = Some(Utc::now());
        self.store.update_subscription(subscription.clone())?;
        Ok(subscription)
    }

    /// Revoke a token
    pub fn revoke_subscription(&self, token: &str) -> CoreResult<()> {
        let mut subscription = self
            .store
            .subscription_by_token(token)
            .ok_or_else(|| CoreError::NotFound("calendar subscription".to_string()))?;
        subscription.revoke();
        self.store.update_subscription(subscription)?;
        Ok(())
    }

    /// The token-authenticated feed body
    pub fn subscription_feed(
        &self,
        token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> CoreResult<String> {
        let subscription = self.resolve_subscription(token)?;
        self.generate_ics_for_person(subscription.person_id, start_date, end_date)
    }

    /// Webcal URL for a subscription token
    pub fn webcal_url(host: &str, token: &str) -> String {
        format!("webcal://{}/api/calendar/subscribe/{}", host, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RotationTemplate;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn setup() -> (CalendarService, Arc<MemoryStore>, Person, NaiveDate) {
        let store = Arc::new(MemoryStore::new());
        let person = Person::resident("Dr. Jane Kim", "kim@example.com", 2);
        store.insert_person(person.clone()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        (CalendarService::new(store.clone()), store, person, date)
    }

    #[test]
    fn test_block_times() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let am = Block::new(date, TimeOfDay::Am);
        let (start, end) = CalendarService::block_time(&am);
        assert_eq!(start, date.and_hms_opt(8, 0, 0).unwrap());
        assert_eq!(end, date.and_hms_opt(12, 0, 0).unwrap());

        let pm = Block::new(date, TimeOfDay::Pm);
        let (start, end) = CalendarService::block_time(&pm);
        assert_eq!(start, date.and_hms_opt(13, 0, 0).unwrap());
        assert_eq!(end, date.and_hms_opt(17, 0, 0).unwrap());
    }

    #[test]
    fn test_person_export_with_role_label() {
        let (service, store, person, date) = setup();
        let rotation = RotationTemplate::new("Sports Medicine", "clinic").with_location("Main Clinic");
        store.insert_rotation_template(rotation.clone()).unwrap();
        let block = Block::new(date, TimeOfDay::Am);
        store.insert_block(block.clone()).unwrap();
        store
            .insert_assignment(
                Assignment::new(block.id, person.id, AssignmentRole::Supervising)
                    .with_rotation(rotation.id),
            )
            .unwrap();

        let ics = service.generate_ics_for_person(person.id, date, date).unwrap();
        assert!(ics.contains("SUMMARY:Sports Medicine (Supervising)"));
        assert!(ics.contains("LOCATION:Main Clinic"));
        assert!(ics.contains("PGY Level: 2"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
    }

    #[test]
    fn test_person_export_not_found() {
        let (service, _, _, date) = setup();
        let result = service.generate_ics_for_person(Uuid::new_v4(), date, date);
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_rotation_export_includes_people() {
        let (service, store, person, date) = setup();
        let second = Person::faculty("Dr. Omar Reed", "reed@example.com");
        store.insert_person(second.clone()).unwrap();
        let rotation = RotationTemplate::new("FMIT Inpatient", "inpatient");
        store.insert_rotation_template(rotation.clone()).unwrap();

        let am = Block::new(date, TimeOfDay::Am);
        let pm = Block::new(date, TimeOfDay::Pm);
        store.insert_block(am.clone()).unwrap();
        store.insert_block(pm.clone()).unwrap();
        store
            .insert_assignment(
                Assignment::new(am.id, person.id, AssignmentRole::Primary).with_rotation(rotation.id),
            )
            .unwrap();
        store
            .insert_assignment(
                Assignment::new(pm.id, second.id, AssignmentRole::Supervising)
                    .with_rotation(rotation.id),
            )
            .unwrap();

        let ics = service.generate_ics_for_rotation(rotation.id, date, date).unwrap();
        assert!(ics.contains("Dr. Jane Kim"));
        assert!(ics.contains("Dr. Omar Reed"));
        assert!(ics.contains("FMIT Inpatient"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
    }

    #[test]
    fn test_subscription_lifecycle() {
        let (service, _, person, date) = setup();
        let subscription = service
            .create_subscription(person.id, "phone", None, Some(Utc::now() + Duration::hours(1)))
            .unwrap();

        let feed = service.subscription_feed(&subscription.token, date, date).unwrap();
        assert!(feed.contains("BEGIN:VCALENDAR"));

        service.revoke_subscription(&subscription.token).unwrap();
        let denied = service.subscription_feed(&subscription.token, date, date);
        assert!(matches!(denied, Err(CoreError::SubscriptionUnauthorized)));
    }

    #[test]
    fn test_subscription_requires_known_person() {
        let (service, _, _, _) = setup();
        let result = service.create_subscription(Uuid::new_v4(), "x", None, None);
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_webcal_url() {
        let url = CalendarService::webcal_url("sched.example.org", "tok123");
        assert_eq!(url, "webcal://sched.example.org/api/calendar/subscribe/tok123");
    }
}
