// Job Lock - result of a lock acquisition

/// Outcome of `LockProvider::acquire`.
///
/// Not `Clone`: releasing consumes the value, so a held lock is released at
/// most once.
#[derive(Debug, PartialEq, Eq)]
pub struct JobLock {
    name: String,
    acquired: bool,
}

impl JobLock {
    pub fn acquired(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acquired: true,
        }
    }

    pub fn denied(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acquired: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }
}
