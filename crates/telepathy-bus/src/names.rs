//! Well-known names and object paths used by Telepathy

use crate::error::{TelepathyError, TelepathyResult};

pub const CONNECTION_BUS_NAME_BASE: &str = "org.freedesktop.Telepathy.Connection.";
pub const CONNECTION_OBJECT_PATH_BASE: &str = "/org/freedesktop/Telepathy/Connection/";
pub const CLIENT_BUS_NAME_BASE: &str = "org.freedesktop.Telepathy.Client.";

pub const CLIENT: &str = "org.freedesktop.Telepathy.Client";
pub const CLIENT_OBSERVER: &str = "org.freedesktop.Telepathy.Client.Observer";

/// Bus name owning the objects below a connection path
///
/// `/org/freedesktop/Telepathy/Connection/gabble/jabber/alice` is owned by
/// `org.freedesktop.Telepathy.Connection.gabble.jabber.alice`. Channel paths
/// (which extend the connection path) work too, as long as the caller passes
/// the connection part.
pub fn connection_bus_name(connection_path: &str) -> TelepathyResult<String> {
    let rest = connection_path
        .strip_prefix(CONNECTION_OBJECT_PATH_BASE)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| TelepathyError::ConnectionPath(connection_path.to_string()))?;
    Ok(format!("{}{}", CONNECTION_BUS_NAME_BASE, rest.replace('/', ".")))
}

/// Escape arbitrary text into a bus name / path element
///
/// Alphanumerics are kept, anything else becomes `_xx` (lowercase hex), and a
/// leading digit is escaped as well. The empty string becomes `_`.
pub fn escape_as_identifier(text: &str) -> String {
    if text.is_empty() {
        return "_".to_string();
    }

    let mut escaped = String::with_capacity(text.len() * 3);
    for (i, byte) in text.bytes().enumerate() {
        let keep = byte.is_ascii_alphabetic() || (i > 0 && byte.is_ascii_digit());
        if keep {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("_{:02x}", byte));
        }
    }
    escaped
}

/// Suffix under [`CLIENT_BUS_NAME_BASE`] for a client
pub fn client_name(name: &str, unique_name: Option<&str>) -> String {
    match unique_name {
        Some(unique) => format!("{}.x{}", name, escape_as_identifier(unique)),
        None => name.to_string(),
    }
}

/// Full well-known bus name of a client
pub fn client_bus_name(client_name: &str) -> String {
    format!("{}{}", CLIENT_BUS_NAME_BASE, client_name)
}

/// Object path of a client: its bus name with dots turned into slashes
pub fn client_object_path(client_name: &str) -> String {
    format!("/{}", client_bus_name(client_name).replace('.', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_bus_name() {
        assert_eq!(
            connection_bus_name("/org/freedesktop/Telepathy/Connection/gabble/jabber/alice_40example_2ecom")
                .unwrap(),
            "org.freedesktop.Telepathy.Connection.gabble.jabber.alice_40example_2ecom"
        );
        assert!(connection_bus_name("/org/freedesktop/Telepathy/Connection/").is_err());
        assert!(connection_bus_name("/com/example/Other").is_err());
    }

    #[test]
    fn test_escape_as_identifier() {
        assert_eq!(escape_as_identifier(""), "_");
        assert_eq!(escape_as_identifier("abc123"), "abc123");
        assert_eq!(escape_as_identifier(":1.42"), "_3a1_2e42");
        assert_eq!(escape_as_identifier("1a"), "_31a");
    }

    #[test]
    fn test_client_names() {
        assert_eq!(client_name("CallObserver", None), "CallObserver");
        assert_eq!(client_name("CallObserver", Some(":1.7")), "CallObserver.x_3a1_2e7");
        assert_eq!(
            client_bus_name("CallObserver"),
            "org.freedesktop.Telepathy.Client.CallObserver"
        );
        assert_eq!(
            client_object_path("CallObserver.x_3a1_2e7"),
            "/org/freedesktop/Telepathy/Client/CallObserver/x_3a1_2e7"
        );
    }
}
