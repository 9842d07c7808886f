use crate::models::Role;

/// The two operator surfaces the console can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleView {
    /// Every managed device, admin only.
    Fleet,
    /// The operator's single bound device.
    BoundDevice,
}

/// Pick the view from the session's decoded role claim. Purely local, no
/// server round-trip. Anything but an explicit admin claim (including the
/// decode-failure default) lands on the least-privileged view.
pub fn select_view(role: Role) -> ConsoleView {
    match role {
        Role::Admin => ConsoleView::Fleet,
        Role::User => ConsoleView::BoundDevice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_gets_the_fleet() {
        assert_eq!(select_view(Role::Admin), ConsoleView::Fleet);
    }

    #[test]
    fn everyone_else_gets_the_bound_device() {
        assert_eq!(select_view(Role::User), ConsoleView::BoundDevice);
        // The decode-failure default takes the same path.
        assert_eq!(select_view(Role::default()), ConsoleView::BoundDevice);
    }
}
