//! Access control list to permission bits

use bucketio_store::{ALL_USERS_URI, AUTHENTICATED_USERS_URI, Grantee, ObjectAcl, Permission};

/// Bits conveyed by READ, WRITE and FULL_CONTROL for one class of principal
struct Bits {
    read: u32,
    write: u32,
    full: u32,
}

const OWNER: Bits = Bits {
    read: 0o400,
    write: 0o200,
    full: 0o600,
};

const AUTHENTICATED: Bits = Bits {
    read: 0o440,
    write: 0o220,
    full: 0o660,
};

const EVERYONE: Bits = Bits {
    read: 0o444,
    write: 0o222,
    full: 0o666,
};

impl Bits {
    const fn for_permission(&self, permission: Permission) -> u32 {
        match permission {
            Permission::Read => self.read,
            Permission::Write => self.write,
            Permission::FullControl => self.full,
            Permission::ReadAcp | Permission::WriteAcp => 0,
        }
    }
}

/// Unix permission bits implied by an object's grants
///
/// Grants to the owner map onto the user bits, grants to the authenticated
/// users group onto user and group, and grants to everyone onto all three.
/// Bits from every grant are OR-ed together; other grantees contribute
/// nothing.
#[must_use]
pub fn acl_to_mode(acl: &ObjectAcl) -> u32 {
    let owner_id = acl.owner.as_ref().map(|owner| owner.id.as_str());
    acl.grants.iter().fold(0, |mode, grant| {
        let bits = match &grant.grantee {
            Grantee::CanonicalUser { id } if Some(id.as_str()) == owner_id => &OWNER,
            Grantee::Group { uri } if uri == AUTHENTICATED_USERS_URI => &AUTHENTICATED,
            Grantee::Group { uri } if uri == ALL_USERS_URI => &EVERYONE,
            _ => return mode,
        };
        mode | bits.for_permission(grant.permission)
    })
}
