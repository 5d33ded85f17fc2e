mod discovery;

pub use discovery::{find_java, JavaLocator};
