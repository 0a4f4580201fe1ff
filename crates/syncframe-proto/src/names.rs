//! Header, cookie, attribute and path names shared by server and client.

/// Request header marking a morph-navigation fetch.
pub const MORPH_HEADER: &str = "s-morph";

/// Request header carrying the live connection id during morph navigation.
pub const CONNECTION_ID_HEADER: &str = "socket-id";

/// Response header carrying a redirect target for morph requests.
pub const REDIRECT_HEADER: &str = "s-redirect";

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session_id";

/// Path of the persistent channel endpoint.
pub const SOCKET_PATH: &str = "/_syncframe";

/// Query parameter naming the pending mount claimed by a new channel.
pub const MOUNT_QUERY: &str = "mount";

/// Attribute stamped on `<html>` with the pending mount token.
pub const MOUNT_ATTRIBUTE: &str = "s-mount";

/// Attribute on `<html>` opting into morph navigation (`s-morph="true"`).
pub const MORPH_ROOT_ATTRIBUTE: &str = "s-morph";

/// Attribute carrying a literal action payload.
pub const PAYLOAD_ATTRIBUTE: &str = "s-payload";

/// Form attribute naming the submit action.
pub const SUBMIT_ATTRIBUTE: &str = "s-submit";

/// Document event recorded after a completed morph navigation.
pub const MORPH_EVENT: &str = "s-morph";
