//! Platform process attributes for action subprocesses.
//!
//! On Unix every spawned process gets its own process group, so terminal
//! signals aimed at the server do not propagate to running actions; shutdown
//! delivers signals explicitly instead. When an action configures a `user`,
//! the name is resolved to uid/gid and applied as child credentials.

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProcAttrError {
    #[error("unable to obtain uid/gid for user '{user}', does it exist?: {reason}")]
    UserLookup { user: String, reason: String },
    #[error("setting the action user is not supported on this platform")]
    UnsupportedUserSwitch,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcAttrs {
    #[cfg(unix)]
    credentials: Option<(u32, u32)>,
}

impl ProcAttrs {
    /// Resolve attributes for an optional action user.
    #[cfg(unix)]
    pub fn for_user(user: Option<&str>) -> Result<Self, ProcAttrError> {
        match user {
            None | Some("") => Ok(Self::default()),
            Some(name) => {
                let credentials = lookup_unix_user(name)?;
                Ok(Self {
                    credentials: Some(credentials),
                })
            }
        }
    }

    #[cfg(not(unix))]
    pub fn for_user(user: Option<&str>) -> Result<Self, ProcAttrError> {
        match user {
            None | Some("") => Ok(Self::default()),
            Some(_) => Err(ProcAttrError::UnsupportedUserSwitch),
        }
    }

    pub fn apply(&self, cmd: &mut Command) {
        #[cfg(unix)]
        {
            cmd.process_group(0);
            if let Some((uid, gid)) = self.credentials {
                cmd.uid(uid).gid(gid);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = cmd;
        }
    }
}

#[cfg(unix)]
fn lookup_unix_user(name: &str) -> Result<(u32, u32), ProcAttrError> {
    use std::ffi::CString;

    let lookup_err = |reason: String| ProcAttrError::UserLookup {
        user: name.to_string(),
        reason,
    };

    let c_name = CString::new(name).map_err(|_| lookup_err("name contains NUL".to_string()))?;

    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; 4096];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let rc = unsafe {
        libc::getpwnam_r(
            c_name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };

    if rc != 0 {
        return Err(lookup_err(
            std::io::Error::from_raw_os_error(rc).to_string(),
        ));
    }
    if result.is_null() {
        return Err(lookup_err("no such user".to_string()));
    }
    Ok((pwd.pw_uid, pwd.pw_gid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_user_needs_no_credentials() {
        assert!(ProcAttrs::for_user(None).is_ok());
        assert!(ProcAttrs::for_user(Some("")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn unknown_user_fails_lookup() {
        let err = ProcAttrs::for_user(Some("no-such-user-hopefully-4242")).unwrap_err();
        assert!(matches!(err, ProcAttrError::UserLookup { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn root_resolves_to_uid_zero() {
        let (uid, _gid) = lookup_unix_user("root").expect("root exists");
        assert_eq!(uid, 0);
    }
}
