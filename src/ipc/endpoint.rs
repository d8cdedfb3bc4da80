//! Local socket naming shared by both ends of the channel.
//!
//! An endpoint containing a path separator is used as a filesystem path.
//! Otherwise it is a namespaced name where the platform supports them
//! (Linux abstract namespace, Windows named pipes), and a file under the
//! temp directory elsewhere.

use std::io;

use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
use interprocess::local_socket::{
    GenericFilePath, GenericNamespaced, ListenerOptions, Name, NameType, ToFsName, ToNsName,
};

fn is_path(endpoint: &str) -> bool {
    endpoint.contains('/') || endpoint.contains('\\')
}

fn socket_name(endpoint: &str) -> io::Result<Name<'static>> {
    if is_path(endpoint) {
        endpoint.to_string().to_fs_name::<GenericFilePath>()
    } else if GenericNamespaced::is_supported() {
        endpoint.to_string().to_ns_name::<GenericNamespaced>()
    } else {
        std::env::temp_dir()
            .join(endpoint)
            .to_string_lossy()
            .into_owned()
            .to_fs_name::<GenericFilePath>()
    }
}

/// Start listening on `endpoint`. Must be called inside a tokio runtime.
pub fn bind(endpoint: &str) -> io::Result<Listener> {
    let name = socket_name(endpoint)?;
    ListenerOptions::new().name(name).create_tokio()
}

/// Open a connection to the primary listening on `endpoint`.
pub async fn connect(endpoint: &str) -> io::Result<Stream> {
    let name = socket_name(endpoint)?;
    Stream::connect(name).await
}
