//! Integration tests for the full engine pipeline.
//!
//! Exercises: rule creation → historical materialization → entry edits with
//! scoped propagation → forecasts, all through the service facade backed by
//! the in-memory store.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use coffers_core::{AccountId, CategoryId, DomainError, FixedClock, UserId};
    use coffers_ledger::OverridableField;
    use coffers_recurring::{
        EditScope, EntryChanges, FieldValue, Frequency, NewRule, RecurringService, RuleUpdate,
        TemplateChanges,
    };
    use coffers_recurring::service::PreviewRequest;
    use coffers_recurring::store::Store;
    use coffers_recurring::template::EntryTemplate;

    use crate::memory::{MemoryAccountCatalog, MemoryStore};

    type Service = RecurringService<Arc<MemoryStore>, Arc<MemoryAccountCatalog>, FixedClock>;

    struct Harness {
        store: Arc<MemoryStore>,
        catalog: Arc<MemoryAccountCatalog>,
        user: UserId,
        account: AccountId,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn harness() -> Harness {
        coffers_observability::init();
        let store = MemoryStore::arc();
        let catalog = Arc::new(MemoryAccountCatalog::new());
        let user = UserId::new();
        let account = AccountId::new();
        catalog.add_account(user, account);
        Harness {
            store,
            catalog,
            user,
            account,
        }
    }

    impl Harness {
        /// A service observing the given date as "today".
        fn service_at(&self, today: NaiveDate) -> Service {
            RecurringService::new(
                self.store.clone(),
                self.catalog.clone(),
                FixedClock::on_date(today),
            )
        }

        fn monthly_rent(&self) -> NewRule {
            NewRule::new(
                "Rent",
                Frequency::Monthly,
                1,
                date(2026, 1, 1),
                EntryTemplate::expense(self.account, "Rent", 1_000),
            )
        }
    }

    #[test]
    fn create_materializes_history_and_is_idempotent() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));

        let created = service
            .create_rule(h.user, h.monthly_rent().until(date(2026, 3, 31)))
            .unwrap();
        assert_eq!(created.materialized, 3);

        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();
        let dates: Vec<_> = entries.iter().map(|e| e.date).collect();
        assert_eq!(
            dates,
            vec![date(2026, 1, 1), date(2026, 2, 1), date(2026, 3, 1)]
        );
        assert!(entries.iter().all(|e| e.amount_cents == 1_000));
        assert!(entries.iter().all(|e| e.is_generated));

        // Re-running creates nothing and touches nothing.
        assert_eq!(service.materialize_rule(h.user, created.rule.id).unwrap(), 0);
        assert_eq!(service.materialize_user(h.user).unwrap(), 0);
        assert_eq!(
            service.entries_for_rule(h.user, created.rule.id).unwrap(),
            entries
        );
    }

    #[test]
    fn a_later_day_extends_history() {
        let h = harness();
        let created = h
            .service_at(date(2026, 2, 15))
            .create_rule(h.user, h.monthly_rent())
            .unwrap();
        assert_eq!(created.materialized, 2);
        assert_eq!(
            created.rule.last_materialized,
            Some(date(2026, 2, 15))
        );

        let later = h.service_at(date(2026, 4, 2));
        assert_eq!(later.materialize_user(h.user).unwrap(), 2);
        assert_eq!(later.materialize_user(h.user).unwrap(), 0);

        let rule = later.get_rule(h.user, created.rule.id).unwrap();
        assert_eq!(rule.last_materialized, Some(date(2026, 4, 2)));
    }

    #[test]
    fn inactive_rules_generate_nothing() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));

        let created = service
            .create_rule(h.user, h.monthly_rent().inactive())
            .unwrap();
        assert_eq!(created.materialized, 0);
        assert!(service.entries_for_rule(h.user, created.rule.id).unwrap().is_empty());

        // Reactivating picks the history back up.
        let update = RuleUpdate {
            is_active: Some(true),
            ..Default::default()
        };
        service.update_rule(h.user, created.rule.id, update).unwrap();
        assert_eq!(service.materialize_user(h.user).unwrap(), 4);
    }

    #[test]
    fn count_bound_wins_over_end_date() {
        let h = harness();
        let service = h.service_at(date(2026, 12, 1));

        let created = service
            .create_rule(
                h.user,
                h.monthly_rent().until(date(2026, 12, 31)).count(2),
            )
            .unwrap();
        assert_eq!(created.materialized, 2);
    }

    #[test]
    fn creation_validates_before_writing() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));

        let unknown_account = NewRule::new(
            "Ghost",
            Frequency::Monthly,
            1,
            date(2026, 1, 1),
            EntryTemplate::expense(AccountId::new(), "Ghost", 1_000),
        );
        let err = service.create_rule(h.user, unknown_account).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(service.list_rules(h.user).unwrap().is_empty());
    }

    #[test]
    fn this_only_pins_the_field_and_records_the_original() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));
        let created = service
            .create_rule(h.user, h.monthly_rent().until(date(2026, 3, 31)))
            .unwrap();
        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();
        let february = &entries[1];

        let outcome = service
            .edit_entry(
                h.user,
                february.id,
                EntryChanges {
                    amount_cents: Some(1_500),
                    ..Default::default()
                },
                EditScope::ThisOnly,
            )
            .unwrap();
        assert_eq!(outcome.updated_entries, 1);
        assert_eq!(outcome.entry.amount_cents, 1_500);
        assert!(outcome.entry.is_overridden(OverridableField::Amount));

        // Template and siblings untouched.
        let rule = service.get_rule(h.user, created.rule.id).unwrap();
        assert_eq!(rule.template.amount_cents, 1_000);
        assert_eq!(rule.version, created.rule.version);
        let entries = service.entries_for_rule(h.user, rule.id).unwrap();
        assert_eq!(entries[0].amount_cents, 1_000);
        assert_eq!(entries[2].amount_cents, 1_000);

        // Re-overriding replaces the value but keeps the first original.
        service
            .edit_entry(
                h.user,
                february.id,
                EntryChanges {
                    amount_cents: Some(1_800),
                    ..Default::default()
                },
                EditScope::ThisOnly,
            )
            .unwrap();
        let records = service.overrides_for_entry(h.user, february.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original, FieldValue::Money(1_000));
        assert_eq!(records[0].overridden, FieldValue::Money(1_800));
    }

    #[test]
    fn rule_update_respects_pins_until_cleared() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));
        let created = service
            .create_rule(h.user, h.monthly_rent().until(date(2026, 3, 31)))
            .unwrap();
        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();
        let february = entries[1].id;

        service
            .edit_entry(
                h.user,
                february,
                EntryChanges {
                    amount_cents: Some(1_500),
                    ..Default::default()
                },
                EditScope::ThisOnly,
            )
            .unwrap();

        // A rule-level amount change reaches every entry except the pinned
        // one.
        let outcome = service
            .update_rule(
                h.user,
                created.rule.id,
                RuleUpdate {
                    template: TemplateChanges {
                        amount_cents: Some(2_000),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.updated_entries, 2);
        assert_eq!(outcome.rule.version, created.rule.version + 1);

        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();
        assert_eq!(entries[0].amount_cents, 2_000);
        assert_eq!(entries[1].amount_cents, 1_500);
        assert_eq!(entries[2].amount_cents, 2_000);

        // Explicitly clearing the pin re-syncs the field to the template.
        let cleared = service.clear_entry_overrides(h.user, february).unwrap();
        assert_eq!(cleared.amount_cents, 2_000);
        assert!(cleared.overridden_fields.is_empty());
        assert!(service.overrides_for_entry(h.user, february).unwrap().is_empty());
    }

    #[test]
    fn entry_edit_with_scope_all_drops_every_pin() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));
        let created = service
            .create_rule(h.user, h.monthly_rent().until(date(2026, 3, 31)))
            .unwrap();
        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();

        service
            .edit_entry(
                h.user,
                entries[1].id,
                EntryChanges {
                    amount_cents: Some(1_500),
                    ..Default::default()
                },
                EditScope::ThisOnly,
            )
            .unwrap();

        let outcome = service
            .edit_entry(
                h.user,
                entries[0].id,
                EntryChanges {
                    amount_cents: Some(2_500),
                    ..Default::default()
                },
                EditScope::All,
            )
            .unwrap();
        assert_eq!(outcome.updated_entries, 3);

        let rule = service.get_rule(h.user, created.rule.id).unwrap();
        assert_eq!(rule.template.amount_cents, 2_500);

        let entries = service.entries_for_rule(h.user, rule.id).unwrap();
        assert!(entries.iter().all(|e| e.amount_cents == 2_500));
        assert!(entries.iter().all(|e| e.overridden_fields.is_empty()));
        assert!(
            service
                .overrides_for_entry(h.user, entries[1].id)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn all_forward_updates_from_the_edited_entry_only() {
        let h = harness();
        let service = h.service_at(date(2026, 5, 1));
        let created = service
            .create_rule(h.user, h.monthly_rent().until(date(2026, 4, 30)))
            .unwrap();
        assert_eq!(created.materialized, 4);
        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();
        let march = &entries[2];
        assert_eq!(march.date, date(2026, 3, 1));

        let outcome = service
            .edit_entry(
                h.user,
                march.id,
                EntryChanges {
                    amount_cents: Some(999),
                    ..Default::default()
                },
                EditScope::AllForward,
            )
            .unwrap();
        assert_eq!(outcome.updated_entries, 2);

        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();
        assert_eq!(entries[0].amount_cents, 1_000); // January
        assert_eq!(entries[1].amount_cents, 1_000); // February
        assert_eq!(entries[2].amount_cents, 999); // March
        assert_eq!(entries[3].amount_cents, 999); // April

        // The template changed, so later months would generate at the new
        // amount too.
        let rule = service.get_rule(h.user, created.rule.id).unwrap();
        assert_eq!(rule.template.amount_cents, 999);
    }

    #[test]
    fn all_forward_clears_only_forward_pins() {
        let h = harness();
        let service = h.service_at(date(2026, 5, 1));
        let created = service
            .create_rule(h.user, h.monthly_rent().until(date(2026, 4, 30)))
            .unwrap();
        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();

        for entry in [&entries[0], &entries[3]] {
            service
                .edit_entry(
                    h.user,
                    entry.id,
                    EntryChanges {
                        memo: Some(Some("pinned".to_string())),
                        ..Default::default()
                    },
                    EditScope::ThisOnly,
                )
                .unwrap();
        }

        service
            .edit_entry(
                h.user,
                entries[2].id,
                EntryChanges {
                    amount_cents: Some(999),
                    ..Default::default()
                },
                EditScope::AllForward,
            )
            .unwrap();

        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();
        // The January pin survives; the April one was in the forward window.
        assert!(entries[0].is_overridden(OverridableField::Memo));
        assert!(!entries[3].is_overridden(OverridableField::Memo));
        assert_eq!(entries[3].memo, None);
    }

    #[test]
    fn date_changes_are_single_occurrence_only() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));
        let created = service
            .create_rule(h.user, h.monthly_rent().until(date(2026, 3, 31)))
            .unwrap();
        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();

        let err = service
            .edit_entry(
                h.user,
                entries[1].id,
                EntryChanges {
                    date: Some(date(2026, 2, 5)),
                    ..Default::default()
                },
                EditScope::All,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // As this-only it pins, and the moved entry is not re-created on the
        // next materialization because the occurrence date is the key.
        service
            .edit_entry(
                h.user,
                entries[1].id,
                EntryChanges {
                    date: Some(date(2026, 2, 5)),
                    ..Default::default()
                },
                EditScope::ThisOnly,
            )
            .unwrap();
        assert_eq!(service.materialize_user(h.user).unwrap(), 0);
    }

    #[test]
    fn forecast_follows_the_current_template() {
        let h = harness();
        let service = h.service_at(date(2026, 2, 15));
        let created = service.create_rule(h.user, h.monthly_rent()).unwrap();

        let first = service
            .forecast(h.user, date(2026, 3, 1), date(2026, 5, 31))
            .unwrap();
        let second = service
            .forecast(h.user, date(2026, 3, 1), date(2026, 5, 31))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|f| f.date).collect::<Vec<_>>(),
            vec![date(2026, 3, 1), date(2026, 4, 1), date(2026, 5, 1)]
        );
        assert!(first.iter().all(|f| f.amount_cents == 1_000));

        // A template edit shows up in the next forecast without touching
        // stored entries.
        service
            .update_rule(
                h.user,
                created.rule.id,
                RuleUpdate {
                    template: TemplateChanges {
                        amount_cents: Some(1_200),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .unwrap();
        let third = service
            .forecast(h.user, date(2026, 3, 1), date(2026, 5, 31))
            .unwrap();
        assert!(third.iter().all(|f| f.amount_cents == 1_200));
        assert_eq!(
            service.entries_for_rule(h.user, created.rule.id).unwrap().len(),
            2
        );
    }

    #[test]
    fn forecast_starts_strictly_after_today() {
        let h = harness();
        let service = h.service_at(date(2026, 3, 1));
        service.create_rule(h.user, h.monthly_rent()).unwrap();

        let forecasts = service
            .forecast(h.user, date(2026, 1, 1), date(2026, 4, 30))
            .unwrap();
        assert_eq!(
            forecasts.iter().map(|f| f.date).collect::<Vec<_>>(),
            vec![date(2026, 4, 1)]
        );
    }

    #[test]
    fn deleting_a_rule_detaches_its_entries() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));
        let created = service
            .create_rule(h.user, h.monthly_rent().until(date(2026, 3, 31)))
            .unwrap();
        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();
        service
            .edit_entry(
                h.user,
                entries[0].id,
                EntryChanges {
                    amount_cents: Some(1_500),
                    ..Default::default()
                },
                EditScope::ThisOnly,
            )
            .unwrap();

        let detached = service.delete_rule(h.user, created.rule.id).unwrap();
        assert_eq!(detached, 3);
        assert!(matches!(
            service.get_rule(h.user, created.rule.id),
            Err(DomainError::NotFound)
        ));

        // The entries survive as standalone records with their values.
        let survivor = h
            .store
            .transact(|tx| {
                coffers_recurring::store::StoreTx::entry(tx, entries[0].id)
            })
            .unwrap()
            .unwrap();
        assert_eq!(survivor.rule_id, None);
        assert_eq!(survivor.amount_cents, 1_500);
        assert!(survivor.overridden_fields.is_empty());
        assert!(survivor.is_generated);
    }

    #[test]
    fn other_users_cannot_see_or_touch_a_rule() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));
        let created = service.create_rule(h.user, h.monthly_rent()).unwrap();

        let stranger = UserId::new();
        assert!(matches!(
            service.get_rule(stranger, created.rule.id),
            Err(DomainError::NotFound)
        ));
        assert!(matches!(
            service.delete_rule(stranger, created.rule.id),
            Err(DomainError::NotFound)
        ));
        let entries = service.entries_for_rule(h.user, created.rule.id).unwrap();
        assert!(matches!(
            service.edit_entry(
                stranger,
                entries[0].id,
                EntryChanges {
                    amount_cents: Some(1),
                    ..Default::default()
                },
                EditScope::ThisOnly,
            ),
            Err(DomainError::NotFound)
        ));
    }

    #[test]
    fn preview_is_pure_and_capped() {
        let h = harness();
        let service = h.service_at(date(2026, 1, 1));
        let request = PreviewRequest {
            frequency: Frequency::Daily,
            interval: 1,
            start_date: date(2026, 1, 1),
            end_date: None,
            occurrence_count: None,
        };

        assert_eq!(service.preview_occurrences(request, None).unwrap().len(), 10);
        assert_eq!(
            service.preview_occurrences(request, Some(5)).unwrap().len(),
            5
        );
        assert_eq!(
            service
                .preview_occurrences(request, Some(10_000))
                .unwrap()
                .len(),
            100
        );
        assert!(service.list_rules(h.user).unwrap().is_empty());
    }

    #[test]
    fn failed_update_leaves_everything_untouched() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));
        let created = service
            .create_rule(h.user, h.monthly_rent().until(date(2026, 3, 31)))
            .unwrap();
        let before_rule = service.get_rule(h.user, created.rule.id).unwrap();
        let before_entries = service.entries_for_rule(h.user, created.rule.id).unwrap();

        // The amount change propagates into entries before the zero
        // interval is rejected; the rollback must undo those writes too.
        let err = service
            .update_rule(
                h.user,
                created.rule.id,
                RuleUpdate {
                    interval: Some(0),
                    template: TemplateChanges {
                        amount_cents: Some(9_999),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        assert_eq!(service.get_rule(h.user, created.rule.id).unwrap(), before_rule);
        assert_eq!(
            service.entries_for_rule(h.user, created.rule.id).unwrap(),
            before_entries
        );
    }

    #[test]
    fn category_checks_guard_template_changes() {
        let h = harness();
        let service = h.service_at(date(2026, 4, 15));
        let created = service.create_rule(h.user, h.monthly_rent()).unwrap();

        let err = service
            .update_rule(
                h.user,
                created.rule.id,
                RuleUpdate {
                    template: TemplateChanges {
                        category: Some(Some(CategoryId::new())),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let known = CategoryId::new();
        h.catalog.add_category(h.user, known);
        let outcome = service
            .update_rule(
                h.user,
                created.rule.id,
                RuleUpdate {
                    template: TemplateChanges {
                        category: Some(Some(known)),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.rule.template.kind.category(), Some(known));
    }
}
