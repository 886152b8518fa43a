//! Resource addressing for databases, collections and documents.
//!
//! A link renders both as the unencoded resource path the store signs
//! (`dbs/{db}/colls/{coll}/docs/{id}`) and as a percent-encoded URL path.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatabaseLink {
    database: String,
}

impl DatabaseLink {
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn collection(&self, collection: impl Into<String>) -> CollectionLink {
        CollectionLink {
            database: self.clone(),
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn url_path(&self) -> String {
        format!("dbs/{}", encode(&self.database))
    }
}

impl fmt::Display for DatabaseLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dbs/{}", self.database)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionLink {
    database: DatabaseLink,
    collection: String,
}

impl CollectionLink {
    #[must_use]
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        DatabaseLink::new(database).collection(collection)
    }

    #[must_use]
    pub fn database(&self) -> &DatabaseLink {
        &self.database
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn document(&self, id: impl Into<String>) -> DocumentLink {
        DocumentLink {
            collection: self.clone(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn url_path(&self) -> String {
        format!("{}/colls/{}", self.database.url_path(), encode(&self.collection))
    }
}

impl fmt::Display for CollectionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/colls/{}", self.database, self.collection)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentLink {
    collection: CollectionLink,
    id: String,
}

impl DocumentLink {
    #[must_use]
    pub fn collection(&self) -> &CollectionLink {
        &self.collection
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn url_path(&self) -> String {
        format!("{}/docs/{}", self.collection.url_path(), encode(&self.id))
    }
}

impl fmt::Display for DocumentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/docs/{}", self.collection, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_links() {
        let doc = CollectionLink::new("ToDoList", "Items").document("item-1");
        assert_eq!(doc.to_string(), "dbs/ToDoList/colls/Items/docs/item-1");
        assert_eq!(doc.collection().to_string(), "dbs/ToDoList/colls/Items");
        assert_eq!(doc.collection().database().to_string(), "dbs/ToDoList");
    }

    #[test]
    fn url_path_encodes_segments_but_signing_path_does_not() {
        let doc = CollectionLink::new("db", "coll").document("a b%c");
        assert_eq!(doc.url_path(), "dbs/db/colls/coll/docs/a%20b%25c");
        assert_eq!(doc.to_string(), "dbs/db/colls/coll/docs/a b%c");
    }
}
