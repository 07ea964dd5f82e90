//! Book catalog.

use crate::model::Book;
use crate::store::{DocumentStore, Record, RecordId, StoreResult};

pub type BookRecord = Record<Book>;

pub fn create(store: &DocumentStore, book: &Book) -> StoreResult<RecordId> {
    let id = store.insert(book)?;
    tracing::info!(book = %id, title = %book.title, "added book");
    Ok(id)
}

pub fn get(store: &DocumentStore, id: &RecordId) -> StoreResult<Option<BookRecord>> {
    store.get(id)
}

pub fn require(store: &DocumentStore, id: &RecordId) -> StoreResult<BookRecord> {
    store.require(id)
}

pub fn list(store: &DocumentStore) -> StoreResult<Vec<BookRecord>> {
    store.list()
}

/// Replace every field of a book.
pub fn update(store: &DocumentStore, id: &RecordId, book: &Book) -> StoreResult<bool> {
    store.update(id, |stored: &mut Book| {
        if stored == book {
            return false;
        }
        *stored = book.clone();
        true
    })
}

pub fn delete(store: &DocumentStore, id: &RecordId) -> StoreResult<bool> {
    store.delete::<Book>(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn dune() -> Book {
        Book {
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            isbn: "978-0441013593".into(),
            published_year: 1965,
            genre: "Science fiction".into(),
        }
    }

    #[test]
    fn crud() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();

        let id = create(&store, &dune()).unwrap();
        assert_eq!(list(&store).unwrap().len(), 1);

        let mut revised = dune();
        revised.genre = "Space opera".into();
        assert!(update(&store, &id, &revised).unwrap());
        assert!(!update(&store, &id, &revised).unwrap());
        assert_eq!(require(&store, &id).unwrap().doc.genre, "Space opera");

        assert!(delete(&store, &id).unwrap());
        assert!(get(&store, &id).unwrap().is_none());
    }

    #[test]
    fn invalid_update_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let id = create(&store, &dune()).unwrap();

        let mut bad = dune();
        bad.published_year = 12_000;
        assert!(matches!(
            update(&store, &id, &bad),
            Err(StoreError::Invalid { .. })
        ));
    }
}
