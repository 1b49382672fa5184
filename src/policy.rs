//! Role-based authorization for every resource the API exposes.
//!
//! Rules live in a single table, [`RULES`]. A request is allowed when at least one rule for its
//! `(resource, action)` pair grants it; pairs with no rule are denied. Read scoping (which rows a
//! list or retrieve may see) is answered separately by [`visibility`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Account role. Ordered so that a higher role holds every capability of a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    HrManager,
    Superuser,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::HrManager => "hr_manager",
            Role::Superuser => "superuser",
        }
    }

    /// Superusers and HR managers see every account and department.
    pub fn sees_everything(self) -> bool {
        self >= Role::HrManager
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "employee" => Ok(Role::Employee),
            "hr_manager" => Ok(Role::HrManager),
            "superuser" => Ok(Role::Superuser),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Account,
    Department,
    EmployeeRecord,
    JobPosting,
    Application,
    Applicant,
    Leave,
    Payroll,
    PerformanceReview,
    ComplianceReport,
    Task,
}

impl Resource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Resource::Account => "account",
            Resource::Department => "department",
            Resource::EmployeeRecord => "employee_record",
            Resource::JobPosting => "job_posting",
            Resource::Application => "application",
            Resource::Applicant => "applicant",
            Resource::Leave => "leave",
            Resource::Payroll => "payroll",
            Resource::PerformanceReview => "performance_review",
            Resource::ComplianceReport => "compliance_report",
            Resource::Task => "task",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    PartialUpdate,
    Destroy,
    UpdateStatus,
    /// Changing an account's role or active flag.
    AssignRole,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Retrieve => "retrieve",
            Action::Create => "create",
            Action::Update => "update",
            Action::PartialUpdate => "partial_update",
            Action::Destroy => "destroy",
            Action::UpdateStatus => "update_status",
            Action::AssignRole => "assign_role",
        }
    }
}

/// How the acting account relates to the record being acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// No single target: list and create.
    Collection,
    /// The target is the actor's own account.
    Own,
    /// The target is some other record.
    Other,
}

/// The authenticated account a request acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    pub department_id: Option<i64>,
}

impl Actor {
    pub fn relation_to_account(&self, account_id: i64) -> Relation {
        if self.id == account_id {
            Relation::Own
        } else {
            Relation::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    AnyActor,
    AtLeast(Role),
    AtLeastOnOthers(Role),
    OwnRecord,
}

impl Grant {
    fn allows(self, actor: &Actor, relation: Relation) -> bool {
        match self {
            Grant::AnyActor => true,
            Grant::AtLeast(role) => actor.role >= role,
            Grant::AtLeastOnOthers(role) => actor.role >= role && relation != Relation::Own,
            Grant::OwnRecord => relation == Relation::Own,
        }
    }
}

struct Rule {
    resource: Resource,
    actions: &'static [Action],
    grant: Grant,
}

const READS: &[Action] = &[Action::List, Action::Retrieve];
const WRITES: &[Action] = &[
    Action::Create,
    Action::Update,
    Action::PartialUpdate,
    Action::Destroy,
];
const EVERYTHING: &[Action] = &[
    Action::List,
    Action::Retrieve,
    Action::Create,
    Action::Update,
    Action::PartialUpdate,
    Action::Destroy,
    Action::UpdateStatus,
];

const fn rule(resource: Resource, actions: &'static [Action], grant: Grant) -> Rule {
    Rule {
        resource,
        actions,
        grant,
    }
}

const RULES: &[Rule] = &[
    rule(Resource::Account, READS, Grant::AnyActor),
    rule(Resource::Account, &[Action::Create], Grant::AtLeast(Role::Superuser)),
    rule(Resource::Account, &[Action::Destroy], Grant::AtLeastOnOthers(Role::Superuser)),
    rule(
        Resource::Account,
        &[Action::Update, Action::PartialUpdate],
        Grant::AtLeast(Role::Superuser),
    ),
    rule(
        Resource::Account,
        &[Action::Update, Action::PartialUpdate],
        Grant::AtLeastOnOthers(Role::HrManager),
    ),
    rule(Resource::Account, &[Action::PartialUpdate], Grant::OwnRecord),
    rule(Resource::Account, &[Action::AssignRole], Grant::AtLeast(Role::Superuser)),
    rule(Resource::Department, READS, Grant::AnyActor),
    rule(Resource::Department, WRITES, Grant::AtLeast(Role::Superuser)),
    rule(Resource::JobPosting, READS, Grant::AnyActor),
    rule(Resource::JobPosting, WRITES, Grant::AtLeast(Role::HrManager)),
    rule(Resource::EmployeeRecord, EVERYTHING, Grant::AnyActor),
    rule(Resource::Application, EVERYTHING, Grant::AnyActor),
    rule(Resource::Applicant, EVERYTHING, Grant::AnyActor),
    rule(Resource::Leave, EVERYTHING, Grant::AnyActor),
    rule(Resource::Payroll, EVERYTHING, Grant::AnyActor),
    rule(Resource::PerformanceReview, EVERYTHING, Grant::AnyActor),
    rule(Resource::ComplianceReport, EVERYTHING, Grant::AnyActor),
    rule(Resource::Task, EVERYTHING, Grant::AnyActor),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("permission denied")]
pub struct Denied;

pub fn authorize(
    actor: &Actor,
    resource: Resource,
    action: Action,
    relation: Relation,
) -> Result<(), Denied> {
    let allowed = RULES
        .iter()
        .filter(|rule| rule.resource == resource && rule.actions.contains(&action))
        .any(|rule| rule.grant.allows(actor, relation));

    if allowed {
        Ok(())
    } else {
        tracing::debug!(
            actor_id = actor.id,
            role = %actor.role,
            resource = resource.as_str(),
            action = action.as_str(),
            ?relation,
            "authorization denied"
        );
        Err(Denied)
    }
}

/// Which rows of a resource an actor may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Only rows attached to this department; `None` means rows with no department.
    Department(Option<i64>),
}

pub fn visibility(actor: &Actor, resource: Resource) -> Scope {
    match resource {
        Resource::Account | Resource::Department if !actor.role.sees_everything() => {
            Scope::Department(actor.department_id)
        }
        _ => Scope::All,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: i64, role: Role, department_id: Option<i64>) -> Actor {
        Actor {
            id,
            role,
            department_id,
        }
    }

    fn allowed(actor: &Actor, resource: Resource, action: Action, relation: Relation) -> bool {
        authorize(actor, resource, action, relation).is_ok()
    }

    #[test]
    fn roles_round_trip_through_strings() {
        for role in [Role::Employee, Role::HrManager, Role::Superuser] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn only_superusers_create_accounts() {
        let admin = actor(1, Role::Superuser, None);
        let hr = actor(2, Role::HrManager, None);
        let staff = actor(3, Role::Employee, Some(1));

        assert!(allowed(&admin, Resource::Account, Action::Create, Relation::Collection));
        assert!(!allowed(&hr, Resource::Account, Action::Create, Relation::Collection));
        assert!(!allowed(&staff, Resource::Account, Action::Create, Relation::Collection));
    }

    #[test]
    fn account_deletion_is_superuser_only_and_never_self() {
        let admin = actor(1, Role::Superuser, None);
        let hr = actor(2, Role::HrManager, None);
        let staff = actor(3, Role::Employee, Some(1));

        assert!(allowed(&admin, Resource::Account, Action::Destroy, Relation::Other));
        assert!(!allowed(&admin, Resource::Account, Action::Destroy, Relation::Own));
        assert!(!allowed(&hr, Resource::Account, Action::Destroy, Relation::Other));
        assert!(!allowed(&hr, Resource::Account, Action::Destroy, Relation::Own));
        assert!(!allowed(&staff, Resource::Account, Action::Destroy, Relation::Other));
    }

    #[test]
    fn hr_manager_updates_others_but_only_patches_self() {
        let hr = actor(2, Role::HrManager, None);

        assert!(allowed(&hr, Resource::Account, Action::Update, Relation::Other));
        assert!(allowed(&hr, Resource::Account, Action::PartialUpdate, Relation::Other));
        assert!(!allowed(&hr, Resource::Account, Action::Update, Relation::Own));
        assert!(allowed(&hr, Resource::Account, Action::PartialUpdate, Relation::Own));
    }

    #[test]
    fn employees_may_only_patch_their_own_account() {
        let staff = actor(3, Role::Employee, Some(1));

        assert!(allowed(&staff, Resource::Account, Action::PartialUpdate, Relation::Own));
        assert!(!allowed(&staff, Resource::Account, Action::Update, Relation::Own));
        assert!(!allowed(&staff, Resource::Account, Action::PartialUpdate, Relation::Other));
        assert!(!allowed(&staff, Resource::Account, Action::Update, Relation::Other));
    }

    #[test]
    fn only_superusers_assign_roles() {
        let admin = actor(1, Role::Superuser, None);
        let hr = actor(2, Role::HrManager, None);
        assert!(allowed(&admin, Resource::Account, Action::AssignRole, Relation::Other));
        assert!(!allowed(&hr, Resource::Account, Action::AssignRole, Relation::Other));
    }

    #[test]
    fn superuser_full_updates_own_account() {
        let admin = actor(1, Role::Superuser, None);
        assert!(allowed(&admin, Resource::Account, Action::Update, Relation::Own));
    }

    #[test]
    fn department_mutations_require_superuser() {
        let admin = actor(1, Role::Superuser, None);
        let hr = actor(2, Role::HrManager, None);
        let staff = actor(3, Role::Employee, Some(1));

        for action in [
            Action::Create,
            Action::Update,
            Action::PartialUpdate,
            Action::Destroy,
        ] {
            assert!(allowed(&admin, Resource::Department, action, Relation::Other));
            assert!(!allowed(&hr, Resource::Department, action, Relation::Other));
            assert!(!allowed(&staff, Resource::Department, action, Relation::Other));
        }
        assert!(allowed(&staff, Resource::Department, Action::List, Relation::Collection));
    }

    #[test]
    fn job_posting_writes_need_hr_manager() {
        let hr = actor(2, Role::HrManager, None);
        let staff = actor(3, Role::Employee, Some(1));

        assert!(allowed(&hr, Resource::JobPosting, Action::Create, Relation::Collection));
        assert!(allowed(&hr, Resource::JobPosting, Action::Destroy, Relation::Other));
        assert!(!allowed(&staff, Resource::JobPosting, Action::Create, Relation::Collection));
        assert!(!allowed(&staff, Resource::JobPosting, Action::PartialUpdate, Relation::Other));
        assert!(allowed(&staff, Resource::JobPosting, Action::Retrieve, Relation::Other));
    }

    #[test]
    fn permissive_resources_accept_any_actor() {
        let staff = actor(3, Role::Employee, None);
        for resource in [
            Resource::EmployeeRecord,
            Resource::Application,
            Resource::Applicant,
            Resource::Leave,
            Resource::Payroll,
            Resource::PerformanceReview,
            Resource::ComplianceReport,
            Resource::Task,
        ] {
            for action in EVERYTHING {
                assert!(
                    allowed(&staff, resource, *action, Relation::Other),
                    "{} {}",
                    resource.as_str(),
                    action.as_str()
                );
            }
        }
    }

    #[test]
    fn unlisted_pairs_are_denied() {
        let admin = actor(1, Role::Superuser, None);
        assert!(!allowed(&admin, Resource::Account, Action::UpdateStatus, Relation::Other));
    }

    #[test]
    fn employees_are_scoped_to_their_department() {
        let staff = actor(3, Role::Employee, Some(7));
        let loner = actor(4, Role::Employee, None);
        let hr = actor(2, Role::HrManager, Some(7));

        assert_eq!(visibility(&staff, Resource::Account), Scope::Department(Some(7)));
        assert_eq!(visibility(&loner, Resource::Department), Scope::Department(None));
        assert_eq!(visibility(&hr, Resource::Account), Scope::All);
        assert_eq!(visibility(&staff, Resource::Leave), Scope::All);
    }
}
