//! Principal lookup
//!
//! Validates that ACE principals exist as local users or groups, and finds
//! out who is running the tool and which NFSv4 idmap domain principals live
//! in.

use crate::acl::ace::Ace;
use regex::Regex;
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::path::Path;
use std::sync::LazyLock;

/// Default location of the NFSv4 id mapper configuration
pub const IDMAPD_CONF: &str = "/etc/idmapd.conf";

/// Domain used when none is configured
pub const DEFAULT_DOMAIN: &str = "localdomain";

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Domain\s*=\s*(\S+)\s*$").expect("Invalid idmapd domain regex")
});

/// Existence checks for users and groups
pub trait PrincipalResolver: Send + Sync {
    fn user_exists(&self, name: &str) -> bool;
    fn group_exists(&self, name: &str) -> bool;
}

/// Resolver backed by the system passwd/group databases (NSS)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl PrincipalResolver for SystemResolver {
    fn user_exists(&self, name: &str) -> bool {
        lookup_user(name).is_some()
    }

    fn group_exists(&self, name: &str) -> bool {
        lookup_group(name)
    }
}

/// Resolver over fixed user and group sets
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    users: HashSet<String>,
    groups: HashSet<String>,
}

impl StaticResolver {
    pub fn new<U, G>(users: U, groups: G) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

impl PrincipalResolver for StaticResolver {
    fn user_exists(&self, name: &str) -> bool {
        self.users.contains(name)
    }

    fn group_exists(&self, name: &str) -> bool {
        self.groups.contains(name)
    }
}

/// Account part of an NFSv4 principal (`alice@example.org` -> `alice`)
pub fn account_name(who: &str) -> &str {
    match who.rsplit_once('@') {
        Some((name, _)) if !name.is_empty() => name,
        _ => who,
    }
}

/// System principals are always valid; otherwise the group flag selects
/// which database is consulted.
pub fn is_valid_principal(resolver: &dyn PrincipalResolver, ace: &Ace) -> bool {
    if ace.is_system() {
        return true;
    }
    let name = account_name(&ace.principal);
    if ace.is_group() {
        resolver.group_exists(name)
    } else {
        resolver.user_exists(name)
    }
}

/// Name of the effective user running this process
pub fn current_username() -> Option<String> {
    // SAFETY: geteuid has no preconditions
    let uid = unsafe { libc::geteuid() };
    lookup_uid(uid).or_else(|| std::env::var("USER").ok())
}

/// NFSv4 idmap domain from an idmapd.conf file
pub fn idmap_domain(conf: &Path) -> Option<String> {
    let text = std::fs::read_to_string(conf).ok()?;
    parse_idmap_domain(&text)
}

fn parse_idmap_domain(text: &str) -> Option<String> {
    DOMAIN_REGEX.captures(text).map(|c| c[1].to_string())
}

const MAX_NSS_BUFFER: usize = 1 << 20;

fn lookup_user(name: &str) -> Option<String> {
    let cname = CString::new(name).ok()?;
    with_passwd(|pwd, buf, result| {
        // SAFETY: all pointers reference live, correctly sized buffers
        unsafe { libc::getpwnam_r(cname.as_ptr(), pwd, buf.as_mut_ptr(), buf.len(), result) }
    })
}

fn lookup_uid(uid: libc::uid_t) -> Option<String> {
    with_passwd(|pwd, buf, result| {
        // SAFETY: all pointers reference live, correctly sized buffers
        unsafe { libc::getpwuid_r(uid, pwd, buf.as_mut_ptr(), buf.len(), result) }
    })
}

fn with_passwd<F>(mut call: F) -> Option<String>
where
    F: FnMut(&mut libc::passwd, &mut Vec<libc::c_char>, &mut *mut libc::passwd) -> libc::c_int,
{
    let mut size = 4096;
    loop {
        // SAFETY: passwd is plain old data; zeroed is a valid bit pattern
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut buf: Vec<libc::c_char> = vec![0; size];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = call(&mut pwd, &mut buf, &mut result);
        if rc == libc::ERANGE && size < MAX_NSS_BUFFER {
            size *= 2;
            continue;
        }
        if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
            return None;
        }
        // SAFETY: pw_name points into buf, which is still alive
        let name = unsafe { CStr::from_ptr(pwd.pw_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}

fn lookup_group(name: &str) -> bool {
    let Ok(cname) = CString::new(name) else {
        return false;
    };
    let mut size = 4096;
    loop {
        // SAFETY: group is plain old data; zeroed is a valid bit pattern
        let mut grp: libc::group = unsafe { std::mem::zeroed() };
        let mut buf: Vec<libc::c_char> = vec![0; size];
        let mut result: *mut libc::group = std::ptr::null_mut();

        // SAFETY: all pointers reference live, correctly sized buffers
        let rc = unsafe {
            libc::getgrnam_r(cname.as_ptr(), &mut grp, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if rc == libc::ERANGE && size < MAX_NSS_BUFFER {
            size *= 2;
            continue;
        }
        return rc == 0 && !result.is_null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::ace::AceType;

    #[test]
    fn test_account_name() {
        assert_eq!(account_name("alice@example.org"), "alice");
        assert_eq!(account_name("alice"), "alice");
        assert_eq!(account_name("OWNER@"), "OWNER");
    }

    #[test]
    fn test_static_resolver_validity() {
        let resolver = StaticResolver::new(["alice"], ["lab"]);

        let user = Ace::new(AceType::Allow, "fd", "alice@example.org", "rxtncy");
        assert!(is_valid_principal(&resolver, &user));

        let group = Ace::new(AceType::Allow, "fdg", "lab@example.org", "rxtncy");
        assert!(is_valid_principal(&resolver, &group));

        // group flag selects the group database
        let wrong_db = Ace::new(AceType::Allow, "fdg", "alice@example.org", "rxtncy");
        assert!(!is_valid_principal(&resolver, &wrong_db));

        let system = Ace::new(AceType::Allow, "", "EVERYONE@", "rtncy");
        assert!(is_valid_principal(&resolver, &system));
    }

    #[test]
    fn test_parse_idmap_domain() {
        let conf = "[General]\n#Domain = commented.org\nVerbosity = 0\nDomain = example.org\n";
        assert_eq!(parse_idmap_domain(conf), Some("example.org".to_string()));
        assert_eq!(parse_idmap_domain("[General]\n"), None);
    }

    #[test]
    fn test_system_resolver_root() {
        assert!(SystemResolver.user_exists("root"));
        assert!(!SystemResolver.user_exists("no-such-user-filer-acl"));
        assert!(!SystemResolver.group_exists("no-such-group-filer-acl"));
    }
}
