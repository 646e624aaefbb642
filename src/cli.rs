/// Command-line interface
///
/// `serve` (the default) runs the HTTP service. The remaining subcommands are
/// operator tools for provisioning what the service only ever reads.
use clap::{Arg, ArgMatches, Command};

pub const CMD_SERVE: &str = "serve";
pub const CMD_HASH_PASSPHRASE: &str = "hash-passphrase";
pub const CMD_GRANT_ROLE: &str = "grant-role";
pub const CMD_REVOKE_ROLE: &str = "revoke-role";
pub const CMD_ISSUE_TOKEN: &str = "issue-token";
pub const CMD_REVOKE_TOKEN: &str = "revoke-token";

pub const ARG_USER: &str = "user";
pub const ARG_ROLE: &str = "role";
pub const ARG_TTL_HOURS: &str = "ttl-hours";
pub const ARG_TOKEN: &str = "token";

/// Parsed operator action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Serve,
    HashPassphrase,
    GrantRole { user_id: String, role: String },
    RevokeRole { user_id: String, role: String },
    IssueToken { user_id: String, ttl_hours: i64 },
    RevokeToken { token: String },
}

#[must_use]
pub fn new() -> Command {
    let user = Arg::new(ARG_USER)
        .long("user")
        .help("User id")
        .required(true);
    let role = Arg::new(ARG_ROLE)
        .long("role")
        .help("Role name")
        .value_parser(["admin", "seller"])
        .default_value("admin");

    Command::new("storefront-admin-gate")
        .about("Two-step admin gate for the storefront")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand(Command::new(CMD_SERVE).about("Run the HTTP service (default)"))
        .subcommand(
            Command::new(CMD_HASH_PASSPHRASE)
                .about("Read a passphrase from stdin and print its Argon2id PHC hash"),
        )
        .subcommand(
            Command::new(CMD_GRANT_ROLE)
                .about("Grant a role to a user")
                .arg(user.clone())
                .arg(role.clone()),
        )
        .subcommand(
            Command::new(CMD_REVOKE_ROLE)
                .about("Revoke a role from a user")
                .arg(user.clone())
                .arg(role),
        )
        .subcommand(
            Command::new(CMD_ISSUE_TOKEN)
                .about("Issue a bearer credential for a user")
                .arg(user)
                .arg(
                    Arg::new(ARG_TTL_HOURS)
                        .long("ttl-hours")
                        .help("Credential lifetime in hours")
                        .default_value("24")
                        .value_parser(clap::value_parser!(i64).range(1..)),
                ),
        )
        .subcommand(
            Command::new(CMD_REVOKE_TOKEN)
                .about("Revoke a bearer credential")
                .arg(
                    Arg::new(ARG_TOKEN)
                        .long("token")
                        .help("Credential to revoke")
                        .required(true),
                ),
        )
}

/// Map matches to an action
pub fn handler(matches: &ArgMatches) -> Action {
    match matches.subcommand() {
        Some((CMD_HASH_PASSPHRASE, _)) => Action::HashPassphrase,
        Some((CMD_GRANT_ROLE, sub)) => Action::GrantRole {
            user_id: string_arg(sub, ARG_USER),
            role: role_arg(sub),
        },
        Some((CMD_REVOKE_ROLE, sub)) => Action::RevokeRole {
            user_id: string_arg(sub, ARG_USER),
            role: role_arg(sub),
        },
        Some((CMD_ISSUE_TOKEN, sub)) => Action::IssueToken {
            user_id: string_arg(sub, ARG_USER),
            ttl_hours: sub.get_one::<i64>(ARG_TTL_HOURS).copied().unwrap_or(24),
        },
        Some((CMD_REVOKE_TOKEN, sub)) => Action::RevokeToken {
            token: string_arg(sub, ARG_TOKEN),
        },
        _ => Action::Serve,
    }
}

fn string_arg(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

fn role_arg(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>(ARG_ROLE)
        .cloned()
        .unwrap_or_else(|| "admin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Action {
        handler(&new().try_get_matches_from(args).unwrap())
    }

    #[test]
    fn test_default_is_serve() {
        assert_eq!(parse(&["gate"]), Action::Serve);
        assert_eq!(parse(&["gate", "serve"]), Action::Serve);
    }

    #[test]
    fn test_operator_subcommands() {
        assert_eq!(parse(&["gate", "hash-passphrase"]), Action::HashPassphrase);
        assert_eq!(
            parse(&["gate", "grant-role", "--user", "u1"]),
            Action::GrantRole {
                user_id: "u1".to_string(),
                role: "admin".to_string()
            }
        );
        assert_eq!(
            parse(&["gate", "revoke-role", "--user", "u1", "--role", "seller"]),
            Action::RevokeRole {
                user_id: "u1".to_string(),
                role: "seller".to_string()
            }
        );
        assert_eq!(
            parse(&["gate", "issue-token", "--user", "u1", "--ttl-hours", "2"]),
            Action::IssueToken {
                user_id: "u1".to_string(),
                ttl_hours: 2
            }
        );
        assert_eq!(
            parse(&["gate", "revoke-token", "--token", "abc"]),
            Action::RevokeToken {
                token: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(new().try_get_matches_from(["gate", "grant-role"]).is_err());
        assert!(new().try_get_matches_from(["gate", "revoke-token"]).is_err());
        assert!(new()
            .try_get_matches_from(["gate", "grant-role", "--user", "u1", "--role", "root"])
            .is_err());
        assert!(new()
            .try_get_matches_from(["gate", "issue-token", "--user", "u1", "--ttl-hours", "0"])
            .is_err());
    }
}
