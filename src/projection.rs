// Sparse field projection: `item(;item)*`, `item := field | group | group.* | group.sub(,sub)*`

use std::collections::HashSet;
use std::hash::Hash;

use crate::error::DirectoryError;

/// A closed set of selectable names.
pub trait Selectable: Sized + Copy + Eq + Hash + 'static {
    const ALL: &'static [Self];

    fn name(self) -> &'static str;

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

macro_rules! selectable {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $ty {
            $($variant,)+
        }

        impl Selectable for $ty {
            const ALL: &'static [Self] = &[$($ty::$variant,)+];

            fn name(self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }
    };
}

selectable!(CommunityField {
    Id => "id",
    PublicId => "publicId",
    ContractAddress => "contractAddress",
    RequestedBy => "requestedBy",
    Name => "name",
    Description => "description",
    Language => "language",
    Currency => "currency",
    City => "city",
    Country => "country",
    Email => "email",
    Gps => "gps",
    Visibility => "visibility",
    Status => "status",
    Review => "review",
    CoverImage => "coverImage",
    AmbassadorAddress => "ambassadorAddress",
    CreatedAt => "createdAt",
    UpdatedAt => "updatedAt",
});

selectable!(CoverField {
    Id => "id",
    Url => "url",
    Width => "width",
    Height => "height",
    Thumbnails => "thumbnails",
});

selectable!(ContractField {
    ClaimAmount => "claimAmount",
    MaxClaim => "maxClaim",
    BaseInterval => "baseInterval",
    IncrementInterval => "incrementInterval",
});

selectable!(MetricsField {
    Beneficiaries => "beneficiaries",
    RemovedBeneficiaries => "removedBeneficiaries",
    Claimed => "claimed",
    Contributed => "contributed",
    Contributors => "contributors",
    Managers => "managers",
    BaseInterval => "baseInterval",
    EstimatedFunds => "estimatedFunds",
});

selectable!(SuspectField {
    Percentage => "percentage",
    Suspect => "suspect",
    CreatedAt => "createdAt",
});

selectable!(ProposalField {
    ProposalId => "proposalId",
});

/// Selected sub-fields of one nested group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<F: Selectable>(HashSet<F>);

impl<F: Selectable> Selection<F> {
    pub fn all() -> Self {
        Self(F::ALL.iter().copied().collect())
    }

    pub fn contains(&self, field: F) -> bool {
        self.0.contains(&field)
    }

    fn extend(&mut self, other: Selection<F>) {
        self.0.extend(other.0);
    }

    fn parse(group: &str, subs: &str) -> Result<Self, DirectoryError> {
        if subs.trim() == "*" {
            return Ok(Self::all());
        }
        let mut fields = HashSet::new();
        for sub in subs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let field = F::parse(sub).ok_or_else(|| {
                DirectoryError::InvalidProjection(format!("{}.{}", group, sub))
            })?;
            fields.insert(field);
        }
        if fields.is_empty() {
            return Ok(Self::all());
        }
        Ok(Self(fields))
    }
}

/// Requested shape of each returned community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProjection {
    pub fields: Selection<CommunityField>,
    pub cover: Option<Selection<CoverField>>,
    pub contract: Option<Selection<ContractField>>,
    pub metrics: Option<Selection<MetricsField>>,
    pub suspect: Option<Selection<SuspectField>>,
    pub proposal: Option<Selection<ProposalField>>,
}

impl Default for FieldProjection {
    fn default() -> Self {
        Self::all()
    }
}

impl FieldProjection {
    /// Everything, every group.
    pub fn all() -> Self {
        Self {
            fields: Selection::all(),
            cover: Some(Selection::all()),
            contract: Some(Selection::all()),
            metrics: Some(Selection::all()),
            suspect: Some(Selection::all()),
            proposal: Some(Selection::all()),
        }
    }

    fn required() -> Self {
        Self {
            fields: Selection(
                [CommunityField::Id, CommunityField::ContractAddress]
                    .into_iter()
                    .collect(),
            ),
            cover: None,
            contract: None,
            metrics: None,
            suspect: None,
            proposal: None,
        }
    }

    /// No field list means the full record. Any list implicitly carries `id`
    /// and `contractAddress`.
    pub fn parse(raw: Option<&str>) -> Result<Self, DirectoryError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::all());
        };

        let mut projection = Self::required();
        for item in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, subs) = match item.split_once('.') {
                Some((name, subs)) => (name.trim(), subs),
                None => (item, "*"),
            };
            match name {
                "cover" => merge(&mut projection.cover, Selection::parse(name, subs)?),
                "contract" => merge(&mut projection.contract, Selection::parse(name, subs)?),
                "metrics" | "state" => {
                    merge(&mut projection.metrics, Selection::parse(name, subs)?)
                }
                "suspect" => merge(&mut projection.suspect, Selection::parse(name, subs)?),
                "proposal" => merge(&mut projection.proposal, Selection::parse(name, subs)?),
                _ if item.contains('.') => {
                    return Err(DirectoryError::InvalidProjection(item.to_string()))
                }
                _ => {
                    let field = CommunityField::parse(name)
                        .ok_or_else(|| DirectoryError::InvalidProjection(item.to_string()))?;
                    projection.fields.0.insert(field);
                }
            }
        }
        Ok(projection)
    }

    pub fn includes(&self, field: CommunityField) -> bool {
        self.fields.contains(field)
    }
}

fn merge<F: Selectable>(slot: &mut Option<Selection<F>>, selection: Selection<F>) {
    match slot {
        Some(existing) => existing.extend(selection),
        None => *slot = Some(selection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_fields_selects_everything() {
        let projection = FieldProjection::parse(None).unwrap();
        assert_eq!(projection, FieldProjection::all());
        assert!(projection.includes(CommunityField::Email));
    }

    #[test]
    fn field_list_implies_identity_fields() {
        let projection = FieldProjection::parse(Some("name;country")).unwrap();
        assert!(projection.includes(CommunityField::Id));
        assert!(projection.includes(CommunityField::ContractAddress));
        assert!(projection.includes(CommunityField::Name));
        assert!(!projection.includes(CommunityField::Email));
        assert!(projection.cover.is_none());
        assert!(projection.metrics.is_none());
    }

    #[test]
    fn nested_groups_select_listed_or_all_subfields() {
        let projection =
            FieldProjection::parse(Some("contract.maxClaim;cover.*;suspect")).unwrap();
        let contract = projection.contract.unwrap();
        assert!(contract.contains(ContractField::MaxClaim));
        assert!(!contract.contains(ContractField::ClaimAmount));
        assert_eq!(projection.cover.unwrap(), Selection::all());
        assert_eq!(projection.suspect.unwrap(), Selection::all());
    }

    #[test]
    fn repeated_groups_merge() {
        let projection =
            FieldProjection::parse(Some("metrics.claimed;state.beneficiaries")).unwrap();
        let metrics = projection.metrics.unwrap();
        assert!(metrics.contains(MetricsField::Claimed));
        assert!(metrics.contains(MetricsField::Beneficiaries));
        assert!(!metrics.contains(MetricsField::Contributed));
    }

    #[test]
    fn rejects_names_outside_the_schema() {
        assert!(matches!(
            FieldProjection::parse(Some("name;password")),
            Err(DirectoryError::InvalidProjection(_))
        ));
        assert!(FieldProjection::parse(Some("contract.owner")).is_err());
        assert!(FieldProjection::parse(Some("name.first")).is_err());
    }
}
