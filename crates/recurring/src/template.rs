use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use coffers_core::{AccountId, CategoryId, DomainError, DomainResult, EntryId, LiabilityId, RuleId, UserId};
use coffers_ledger::{EntryKind, LedgerEntry};

/// Kind-specific template payload.
///
/// A closed variant: each kind carries only the links valid for it. An
/// income template cannot hold a liability, and a transfer cannot hold a
/// category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TemplateKind {
    Income {
        category: Option<CategoryId>,
        subcategory: Option<CategoryId>,
    },
    Expense {
        category: Option<CategoryId>,
        subcategory: Option<CategoryId>,
        liability_id: Option<LiabilityId>,
    },
    Transfer {
        to_account_id: AccountId,
    },
}

impl TemplateKind {
    pub fn entry_kind(&self) -> EntryKind {
        match self {
            TemplateKind::Income { .. } => EntryKind::Income,
            TemplateKind::Expense { .. } => EntryKind::Expense,
            TemplateKind::Transfer { .. } => EntryKind::Transfer,
        }
    }

    pub fn category(&self) -> Option<CategoryId> {
        match self {
            TemplateKind::Income { category, .. } | TemplateKind::Expense { category, .. } => {
                *category
            }
            TemplateKind::Transfer { .. } => None,
        }
    }

    pub fn subcategory(&self) -> Option<CategoryId> {
        match self {
            TemplateKind::Income { subcategory, .. }
            | TemplateKind::Expense { subcategory, .. } => *subcategory,
            TemplateKind::Transfer { .. } => None,
        }
    }

    pub fn liability_id(&self) -> Option<LiabilityId> {
        match self {
            TemplateKind::Expense { liability_id, .. } => *liability_id,
            _ => None,
        }
    }

    pub fn to_account_id(&self) -> Option<AccountId> {
        match self {
            TemplateKind::Transfer { to_account_id } => Some(*to_account_id),
            _ => None,
        }
    }

    pub fn supports_category(&self) -> bool {
        !matches!(self, TemplateKind::Transfer { .. })
    }

    pub fn supports_liability(&self) -> bool {
        matches!(self, TemplateKind::Expense { .. })
    }
}

/// The prototype every generated entry inherits at generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryTemplate {
    pub account_id: AccountId,
    pub name: String,
    /// Positive, smallest currency unit.
    pub amount_cents: i64,
    #[serde(flatten)]
    pub kind: TemplateKind,
    pub description: Option<String>,
    pub memo: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<JsonValue>,
}

impl EntryTemplate {
    pub fn income(account_id: AccountId, name: impl Into<String>, amount_cents: i64) -> Self {
        Self::with_kind(
            account_id,
            name,
            amount_cents,
            TemplateKind::Income {
                category: None,
                subcategory: None,
            },
        )
    }

    pub fn expense(account_id: AccountId, name: impl Into<String>, amount_cents: i64) -> Self {
        Self::with_kind(
            account_id,
            name,
            amount_cents,
            TemplateKind::Expense {
                category: None,
                subcategory: None,
                liability_id: None,
            },
        )
    }

    pub fn transfer(
        account_id: AccountId,
        to_account_id: AccountId,
        name: impl Into<String>,
        amount_cents: i64,
    ) -> Self {
        Self::with_kind(
            account_id,
            name,
            amount_cents,
            TemplateKind::Transfer { to_account_id },
        )
    }

    pub fn with_kind(
        account_id: AccountId,
        name: impl Into<String>,
        amount_cents: i64,
        kind: TemplateKind,
    ) -> Self {
        Self {
            account_id,
            name: name.into(),
            amount_cents,
            kind,
            description: None,
            memo: None,
            tags: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("template name must not be empty"));
        }
        if self.amount_cents <= 0 {
            return Err(DomainError::validation("template amount must be positive"));
        }
        if let TemplateKind::Transfer { to_account_id } = &self.kind {
            if *to_account_id == self.account_id {
                return Err(DomainError::validation(
                    "transfer source and destination accounts must differ",
                ));
            }
        }
        Ok(())
    }

    /// Build the concrete entry for one occurrence date.
    pub fn build_entry(
        &self,
        id: EntryId,
        user_id: UserId,
        rule_id: RuleId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> LedgerEntry {
        LedgerEntry {
            id,
            user_id,
            account_id: self.account_id,
            kind: self.kind.entry_kind(),
            name: self.name.clone(),
            amount_cents: self.amount_cents,
            date,
            occurrence_date: date,
            category: self.kind.category(),
            subcategory: self.kind.subcategory(),
            liability_id: self.kind.liability_id(),
            to_account_id: self.kind.to_account_id(),
            description: self.description.clone(),
            memo: self.memo.clone(),
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
            is_generated: true,
            rule_id: Some(rule_id),
            overridden_fields: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial template update.
///
/// `None` leaves a field unchanged; for optional values, `Some(None)` clears
/// them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateChanges {
    pub name: Option<String>,
    pub amount_cents: Option<i64>,
    pub category: Option<Option<CategoryId>>,
    pub subcategory: Option<Option<CategoryId>>,
    pub liability_id: Option<Option<LiabilityId>>,
    pub description: Option<Option<String>>,
    pub memo: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Option<JsonValue>>,
}

impl TemplateChanges {
    /// A change-set touching every template-derived field.
    ///
    /// Used to re-sync entries to the whole template after their pins were
    /// dropped, rather than only to the fields one edit happened to change.
    pub fn resync(template: &EntryTemplate) -> Self {
        Self {
            name: Some(template.name.clone()),
            amount_cents: Some(template.amount_cents),
            category: Some(template.kind.category()),
            subcategory: Some(template.kind.subcategory()),
            liability_id: Some(template.kind.liability_id()),
            description: Some(template.description.clone()),
            memo: Some(template.memo.clone()),
            tags: Some(template.tags.clone()),
            metadata: Some(template.metadata.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.amount_cents.is_none()
            && self.category.is_none()
            && self.subcategory.is_none()
            && self.liability_id.is_none()
            && self.description.is_none()
            && self.memo.is_none()
            && self.tags.is_none()
            && self.metadata.is_none()
    }

    /// Apply the change-set to a template, validating kind compatibility.
    pub fn apply(&self, template: &mut EntryTemplate) -> DomainResult<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("template name must not be empty"));
            }
            template.name = name.clone();
        }
        if let Some(amount) = self.amount_cents {
            if amount <= 0 {
                return Err(DomainError::validation("template amount must be positive"));
            }
            template.amount_cents = amount;
        }
        if self.category.is_some() || self.subcategory.is_some() {
            if !template.kind.supports_category() {
                return Err(DomainError::validation(
                    "transfer templates do not carry a category",
                ));
            }
        }
        if self.liability_id.is_some() && !template.kind.supports_liability() {
            return Err(DomainError::validation(
                "only expense templates can link a liability",
            ));
        }
        match &mut template.kind {
            TemplateKind::Income {
                category,
                subcategory,
            } => {
                if let Some(value) = self.category {
                    *category = value;
                }
                if let Some(value) = self.subcategory {
                    *subcategory = value;
                }
            }
            TemplateKind::Expense {
                category,
                subcategory,
                liability_id,
            } => {
                if let Some(value) = self.category {
                    *category = value;
                }
                if let Some(value) = self.subcategory {
                    *subcategory = value;
                }
                if let Some(value) = self.liability_id {
                    *liability_id = value;
                }
            }
            TemplateKind::Transfer { .. } => {}
        }
        if let Some(description) = &self.description {
            template.description = description.clone();
        }
        if let Some(memo) = &self.memo {
            template.memo = memo.clone();
        }
        if let Some(tags) = &self.tags {
            template.tags = tags.clone();
        }
        if let Some(metadata) = &self.metadata {
            template.metadata = metadata.clone();
        }
        Ok(())
    }
}
