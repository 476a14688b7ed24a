//! Annotation repository
//!
//! Strokes and shapes are stored in two tables keyed by annotation id and
//! grouped by `(document_path, page_number)`. Stroke points are a JSON
//! array of `{x, y, pressure, timestamp}` objects; colors are packed ARGB
//! integers. `seq` preserves creation order within a document.

use crate::StorageError;
use pdf_annotator_core::{
    AnnotationId, Color, PageAnnotations, ShapeAnnotation, ShapeKind, Stroke, StrokePoint,
};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub struct AnnotationRepository<'c> {
    conn: &'c Connection,
}

struct StrokeRow {
    id: String,
    page_number: u32,
    points: String,
    color: i64,
    width: f64,
    is_highlighter: bool,
}

struct ShapeRow {
    id: String,
    page_number: u32,
    kind: String,
    start: (f64, f64),
    end: (f64, f64),
    color: i64,
    width: f64,
    is_filled: bool,
}

impl<'c> AnnotationRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Every annotation of a document, grouped by page in creation order
    ///
    /// Rows that cannot be decoded are skipped with a warning so one bad
    /// row does not hide the rest of the document.
    pub fn load_for_document(
        &self,
        document_path: &str,
    ) -> Result<BTreeMap<u32, PageAnnotations>, StorageError> {
        let mut pages: BTreeMap<u32, PageAnnotations> = BTreeMap::new();

        let mut stmt = self.conn.prepare(
            "SELECT id, page_number, points, color, width, is_highlighter
             FROM strokes WHERE document_path = ?1
             ORDER BY page_number, seq",
        )?;
        let strokes = stmt
            .query_map([document_path], |row| {
                Ok(StrokeRow {
                    id: row.get(0)?,
                    page_number: row.get(1)?,
                    points: row.get(2)?,
                    color: row.get(3)?,
                    width: row.get(4)?,
                    is_highlighter: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for row in strokes {
            let points: Vec<StrokePoint> = match serde_json::from_str(&row.points) {
                Ok(points) => points,
                Err(err) => {
                    warn!(id = %row.id, error = %err, "skipping stroke with unreadable points");
                    continue;
                }
            };
            pages.entry(row.page_number).or_default().strokes.push(Stroke {
                id: AnnotationId::from(row.id),
                points,
                color: Color::from_argb(row.color as u32),
                width: row.width as f32,
                is_highlighter: row.is_highlighter,
                page_number: row.page_number,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, page_number, type, start_x, start_y, end_x, end_y, color, width, is_filled
             FROM shapes WHERE document_path = ?1
             ORDER BY page_number, seq",
        )?;
        let shapes = stmt
            .query_map([document_path], |row| {
                Ok(ShapeRow {
                    id: row.get(0)?,
                    page_number: row.get(1)?,
                    kind: row.get(2)?,
                    start: (row.get(3)?, row.get(4)?),
                    end: (row.get(5)?, row.get(6)?),
                    color: row.get(7)?,
                    width: row.get(8)?,
                    is_filled: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for row in shapes {
            let kind: ShapeKind = match row.kind.parse() {
                Ok(kind) => kind,
                Err(err) => {
                    warn!(id = %row.id, error = %err, "skipping shape of unknown type");
                    continue;
                }
            };
            pages.entry(row.page_number).or_default().shapes.push(ShapeAnnotation {
                id: AnnotationId::from(row.id),
                kind,
                start_x: row.start.0 as f32,
                start_y: row.start.1 as f32,
                end_x: row.end.0 as f32,
                end_y: row.end.1 as f32,
                color: Color::from_argb(row.color as u32),
                width: row.width as f32,
                is_filled: row.is_filled,
                page_number: row.page_number,
            });
        }

        debug!(document = document_path, pages = pages.len(), "loaded annotations");
        Ok(pages)
    }

    /// Replace everything stored for a document with `pages`
    ///
    /// Destructive: any annotation of the document missing from `pages` is
    /// deleted. Runs in one transaction, so a failure leaves the previous
    /// contents untouched.
    pub fn save_all(
        &self,
        document_path: &str,
        pages: &BTreeMap<u32, PageAnnotations>,
    ) -> Result<(), StorageError> {
        let previous = self.count_for_document(document_path)?;
        let incoming: usize = pages.values().map(PageAnnotations::len).sum();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM strokes WHERE document_path = ?1", [document_path])?;
        tx.execute("DELETE FROM shapes WHERE document_path = ?1", [document_path])?;

        {
            let mut insert_stroke = tx.prepare(
                "INSERT INTO strokes
                 (id, document_path, page_number, points, color, width, is_highlighter, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let mut insert_shape = tx.prepare(
                "INSERT INTO shapes
                 (id, document_path, page_number, type, start_x, start_y, end_x, end_y,
                  color, width, is_filled, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;

            let mut seq: i64 = 0;
            for (page_number, page) in pages {
                for stroke in &page.strokes {
                    let points = serde_json::to_string(&stroke.points)?;
                    insert_stroke.execute(params![
                        stroke.id.as_str(),
                        document_path,
                        page_number,
                        points,
                        i64::from(stroke.color.to_argb()),
                        f64::from(stroke.width),
                        stroke.is_highlighter,
                        seq,
                    ])?;
                    seq += 1;
                }
                for shape in &page.shapes {
                    insert_shape.execute(params![
                        shape.id.as_str(),
                        document_path,
                        page_number,
                        shape.kind.as_str(),
                        f64::from(shape.start_x),
                        f64::from(shape.start_y),
                        f64::from(shape.end_x),
                        f64::from(shape.end_y),
                        i64::from(shape.color.to_argb()),
                        f64::from(shape.width),
                        shape.is_filled,
                        seq,
                    ])?;
                    seq += 1;
                }
            }
        }
        tx.commit()?;

        if incoming < previous {
            warn!(
                document = document_path,
                previous,
                saved = incoming,
                "save replaced annotations with a smaller set; omitted rows were deleted"
            );
        }
        debug!(document = document_path, count = incoming, "saved annotations");
        Ok(())
    }

    /// Delete a single stroke or shape by id
    pub fn delete_one(&self, id: &AnnotationId) -> Result<bool, StorageError> {
        let strokes = self.conn.execute("DELETE FROM strokes WHERE id = ?1", [id.as_str()])?;
        let shapes = self.conn.execute("DELETE FROM shapes WHERE id = ?1", [id.as_str()])?;
        Ok(strokes + shapes > 0)
    }

    /// Delete every annotation of a document, returning how many were removed
    pub fn delete_all_for_document(&self, document_path: &str) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let strokes = tx.execute("DELETE FROM strokes WHERE document_path = ?1", [document_path])?;
        let shapes = tx.execute("DELETE FROM shapes WHERE document_path = ?1", [document_path])?;
        tx.commit()?;
        debug!(document = document_path, removed = strokes + shapes, "cleared annotations");
        Ok(strokes + shapes)
    }

    /// Number of stored strokes and shapes of a document
    pub fn count_for_document(&self, document_path: &str) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM strokes WHERE document_path = ?1)
                  + (SELECT COUNT(*) FROM shapes WHERE document_path = ?1)",
            [document_path],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::open_in_memory;
    use pdf_annotator_core::PagePoint;

    const DOC: &str = "/storage/docs/report.pdf";

    fn stroke(page: u32, points: &[(f32, f32)]) -> Stroke {
        Stroke::new(
            page,
            points
                .iter()
                .enumerate()
                .map(|(i, (x, y))| StrokePoint::new(*x, *y, 0.5, i as i64 * 16))
                .collect(),
            Color::new(0x80, 10, 20, 30),
            2.5,
        )
    }

    fn sample() -> BTreeMap<u32, PageAnnotations> {
        let mut pages = BTreeMap::new();
        pages.insert(
            0,
            PageAnnotations {
                strokes: vec![
                    stroke(0, &[(1.0, 2.0), (3.5, 4.25)]),
                    stroke(0, &[(9.0, 9.0)]).highlighter(true),
                ],
                shapes: vec![ShapeAnnotation::new(
                    0,
                    ShapeKind::Arrow,
                    PagePoint::new(10.0, 10.0),
                    PagePoint::new(50.5, 80.25),
                    Color::RED,
                    3.0,
                )
                .filled(true)],
            },
        );
        pages.insert(
            4,
            PageAnnotations { strokes: vec![stroke(4, &[(100.0, 200.0), (110.0, 210.0)])], shapes: vec![] },
        );
        pages
    }

    #[test]
    fn test_save_then_load_reproduces_everything() {
        let conn = open_in_memory().unwrap();
        let repo = AnnotationRepository::new(&conn);
        let pages = sample();

        repo.save_all(DOC, &pages).unwrap();
        let loaded = repo.load_for_document(DOC).unwrap();

        assert_eq!(loaded, pages);
        assert_eq!(repo.count_for_document(DOC).unwrap(), 4);
    }

    #[test]
    fn test_color_with_high_alpha_survives() {
        let conn = open_in_memory().unwrap();
        let repo = AnnotationRepository::new(&conn);
        let mut pages = BTreeMap::new();
        let mut white = stroke(0, &[(1.0, 1.0)]);
        white.color = Color::WHITE;
        pages.insert(0, PageAnnotations { strokes: vec![white.clone()], shapes: vec![] });

        repo.save_all(DOC, &pages).unwrap();
        let loaded = repo.load_for_document(DOC).unwrap();
        assert_eq!(loaded[&0].strokes[0].color, Color::WHITE);
    }

    #[test]
    fn test_save_is_destructive_replace() {
        let conn = open_in_memory().unwrap();
        let repo = AnnotationRepository::new(&conn);
        repo.save_all(DOC, &sample()).unwrap();

        let mut smaller = BTreeMap::new();
        smaller.insert(2, PageAnnotations { strokes: vec![stroke(2, &[(5.0, 5.0)])], shapes: vec![] });
        repo.save_all(DOC, &smaller).unwrap();

        let loaded = repo.load_for_document(DOC).unwrap();
        assert_eq!(loaded, smaller);
    }

    #[test]
    fn test_documents_are_isolated() {
        let conn = open_in_memory().unwrap();
        let repo = AnnotationRepository::new(&conn);
        repo.save_all(DOC, &sample()).unwrap();
        repo.save_all("/other.pdf", &BTreeMap::new()).unwrap();

        assert_eq!(repo.count_for_document(DOC).unwrap(), 4);
        assert!(repo.load_for_document("/other.pdf").unwrap().is_empty());
    }

    #[test]
    fn test_delete_one_and_all() {
        let conn = open_in_memory().unwrap();
        let repo = AnnotationRepository::new(&conn);
        let pages = sample();
        repo.save_all(DOC, &pages).unwrap();

        let shape_id = pages[&0].shapes[0].id.clone();
        assert!(repo.delete_one(&shape_id).unwrap());
        assert!(!repo.delete_one(&shape_id).unwrap());
        assert_eq!(repo.count_for_document(DOC).unwrap(), 3);

        assert_eq!(repo.delete_all_for_document(DOC).unwrap(), 3);
        assert_eq!(repo.count_for_document(DOC).unwrap(), 0);
    }

    #[test]
    fn test_unknown_shape_type_is_skipped() {
        let conn = open_in_memory().unwrap();
        let repo = AnnotationRepository::new(&conn);
        repo.save_all(DOC, &sample()).unwrap();
        conn.execute("UPDATE shapes SET type = 'TRIANGLE'", []).unwrap();

        let loaded = repo.load_for_document(DOC).unwrap();
        assert!(loaded[&0].shapes.is_empty());
        assert_eq!(loaded[&0].strokes.len(), 2);
    }

    #[test]
    fn test_points_column_is_json() {
        let conn = open_in_memory().unwrap();
        let repo = AnnotationRepository::new(&conn);
        repo.save_all(DOC, &sample()).unwrap();

        let raw: String = conn
            .query_row("SELECT points FROM strokes WHERE page_number = 4", [], |row| row.get(0))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["x"], 100.0);
        assert_eq!(value[1]["timestamp"], 16);
    }
}
