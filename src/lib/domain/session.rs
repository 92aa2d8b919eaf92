use alloy::primitives::Address;

/// Explicit connection context passed to every lifecycle call.
///
/// A session is either connected to an account or disconnected. Operations
/// that need an account (creation, verification) refuse to run on a
/// disconnected session before touching any external capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Session {
    account: Option<Address>,
}

impl Session {
    pub fn connected(account: Address) -> Self {
        Self {
            account: Some(account),
        }
    }

    pub fn disconnected() -> Self {
        Self { account: None }
    }

    pub fn connect(&mut self, account: Address) {
        self.account = Some(account);
    }

    pub fn disconnect(&mut self) {
        self.account = None;
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_disconnect_cycle() {
        let account = Address::repeat_byte(0xA1);
        let mut session = Session::disconnected();
        assert!(!session.is_connected());

        session.connect(account);
        assert_eq!(session.account(), Some(account));

        session.disconnect();
        assert_eq!(session, Session::default());
    }
}
