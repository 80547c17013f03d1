use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::models::{
    Cleared, FeedbackRecord, KidsSafetySummary, NewFeedback, NewScan, ScanRecord, SearchFilter,
    SearchPage, SearchQuery, SearchSort, Stats,
};

/// Why feedback could not be attached to a scan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("scan {0} not found")]
    ScanNotFound(i64),

    #[error("scan {0} already has a rating")]
    AlreadyRated(i64),
}

const SCAN_COLUMNS: &str = "id, url, domain, title, performance_score, grade, load_time,
    status_code, scan_method, is_safe, kids_rating, kids_score, kids_confidence,
    kids_sources, kids_warnings, user_rating, comment, name, created_at";

const FEEDBACK_COLUMNS: &str = "id, rating, comment, name, scan_id, created_at";

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the database file
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        info!("Opening database at {:?}", path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Initialize database tables
    pub fn init_tables(&self) -> Result<()> {
        info!("Initializing database tables");
        let conn = self.connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS scans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                domain TEXT NOT NULL,
                title TEXT NOT NULL,
                performance_score REAL NOT NULL,
                grade TEXT NOT NULL,
                load_time REAL NOT NULL,
                status_code INTEGER NOT NULL,
                scan_method TEXT NOT NULL,
                is_safe INTEGER NOT NULL,
                kids_rating TEXT,
                kids_score INTEGER,
                kids_confidence TEXT,
                kids_sources TEXT,
                kids_warnings TEXT,
                user_rating INTEGER,
                comment TEXT,
                name TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scans_domain ON scans (domain)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rating INTEGER NOT NULL,
                comment TEXT,
                name TEXT NOT NULL,
                scan_id INTEGER,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (scan_id) REFERENCES scans(id)
            )",
            [],
        )?;

        Ok(())
    }

    /// Store a finished scan and return the stored row
    pub fn insert_scan(&self, scan: &NewScan) -> Result<ScanRecord> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        let created_at = chrono::Utc::now().timestamp();
        let (rating, score, confidence, sources, warnings) = match &scan.kids_safety {
            Some(k) => (
                Some(k.rating.clone()),
                Some(k.score),
                Some(k.confidence.clone()),
                Some(serde_json::to_string(&k.sources)?),
                Some(serde_json::to_string(&k.warnings)?),
            ),
            None => (None, None, None, None, None),
        };

        tx.execute(
            "INSERT INTO scans (
                url, domain, title, performance_score, grade, load_time, status_code,
                scan_method, is_safe, kids_rating, kids_score, kids_confidence,
                kids_sources, kids_warnings, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                scan.url,
                scan.domain,
                scan.title,
                scan.performance_score,
                scan.grade,
                scan.load_time,
                scan.status_code,
                scan.scan_method.as_str(),
                scan.is_safe,
                rating,
                score,
                confidence,
                sources,
                warnings,
                created_at,
            ],
        )
        .context("Failed to insert scan")?;

        let id = tx.last_insert_rowid();
        tx.commit()?;
        debug!("Stored scan {} for {}", id, scan.domain);

        Ok(ScanRecord {
            id,
            url: scan.url.clone(),
            domain: scan.domain.clone(),
            title: scan.title.clone(),
            performance_score: scan.performance_score,
            grade: scan.grade.clone(),
            load_time: scan.load_time,
            status_code: scan.status_code,
            scan_method: scan.scan_method.as_str().to_string(),
            is_safe: scan.is_safe,
            kids_safety: scan.kids_safety.clone(),
            user_rating: None,
            comment: None,
            name: None,
            timestamp: created_at,
        })
    }

    /// Get a scan by ID
    pub fn get_scan(&self, id: i64) -> Result<Option<ScanRecord>> {
        let conn = self.connection()?;
        let scan = conn
            .query_row(
                &format!("SELECT {} FROM scans WHERE id = ?1", SCAN_COLUMNS),
                params![id],
                scan_from_row,
            )
            .optional()?;
        Ok(scan)
    }

    /// Most recent scan of a domain
    pub fn find_latest_by_domain(&self, domain: &str) -> Result<Option<ScanRecord>> {
        let conn = self.connection()?;
        let scan = conn
            .query_row(
                &format!(
                    "SELECT {} FROM scans WHERE domain = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
                    SCAN_COLUMNS
                ),
                params![domain.to_lowercase()],
                scan_from_row,
            )
            .optional()?;
        Ok(scan)
    }

    /// Most recent scans, newest first
    pub fn recent_scans(&self, limit: u32) -> Result<Vec<ScanRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scans ORDER BY created_at DESC, id DESC LIMIT ?1",
            SCAN_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit], scan_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Search the latest scan of every domain matching `query.q`
    pub fn search_scans(&self, query: &SearchQuery) -> Result<SearchPage> {
        let filter = match query.filter {
            SearchFilter::All => "",
            SearchFilter::Safe => " AND kids_rating IN ('SAFE_FOR_ALL', 'PARENTAL_GUIDANCE')",
            SearchFilter::Unsafe => " AND kids_rating IN ('MATURE', 'BLOCKED')",
        };
        let order = match query.sort {
            SearchSort::Recent => "created_at DESC, id DESC",
            SearchSort::Score => "performance_score DESC, id DESC",
            SearchSort::Name => "domain ASC, id DESC",
        };
        let condition = format!(
            "domain LIKE ?1 ESCAPE '\\' AND id IN (SELECT MAX(id) FROM scans GROUP BY domain){}",
            filter
        );

        let pattern = format!("%{}%", escape_like(&query.q.trim().to_lowercase()));
        let page = query.page();
        let per_page = query.per_page();
        let offset = i64::from(page - 1) * i64::from(per_page);

        let conn = self.connection()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM scans WHERE {}", condition),
            params![pattern],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scans WHERE {} ORDER BY {} LIMIT ?2 OFFSET ?3",
            SCAN_COLUMNS, condition, order
        ))?;
        let results = stmt
            .query_map(params![pattern, per_page, offset], scan_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(SearchPage {
            results,
            total,
            page,
            per_page,
        })
    }

    /// Store feedback, attaching it to its scan when one is named.
    ///
    /// A scan takes at most one rating; a second link fails with [`LinkError`]
    /// and nothing is written.
    pub fn insert_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackRecord> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let created_at = chrono::Utc::now().timestamp();

        if let Some(scan_id) = feedback.scan_id {
            let existing: Option<Option<u8>> = tx
                .query_row(
                    "SELECT user_rating FROM scans WHERE id = ?1",
                    params![scan_id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                None => return Err(LinkError::ScanNotFound(scan_id).into()),
                Some(Some(_)) => return Err(LinkError::AlreadyRated(scan_id).into()),
                Some(None) => {
                    tx.execute(
                        "UPDATE scans SET user_rating = ?1, comment = ?2, name = ?3
                         WHERE id = ?4 AND user_rating IS NULL",
                        params![feedback.rating, feedback.comment, feedback.name, scan_id],
                    )?;
                }
            }
        }

        tx.execute(
            "INSERT INTO feedback (rating, comment, name, scan_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                feedback.rating,
                feedback.comment,
                feedback.name,
                feedback.scan_id,
                created_at
            ],
        )
        .context("Failed to insert feedback")?;

        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(FeedbackRecord {
            id,
            rating: feedback.rating,
            comment: feedback.comment.clone(),
            name: feedback.name.clone(),
            scan_id: feedback.scan_id,
            timestamp: created_at,
        })
    }

    /// Most recent feedback, newest first
    pub fn recent_feedback(&self, limit: u32) -> Result<Vec<FeedbackRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feedback ORDER BY created_at DESC, id DESC LIMIT ?1",
            FEEDBACK_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(FeedbackRecord {
                id: row.get(0)?,
                rating: row.get(1)?,
                comment: row.get(2)?,
                name: row.get(3)?,
                scan_id: row.get(4)?,
                timestamp: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Stored totals; `live_visitors` is left at zero for the caller to fill
    pub fn stats(&self) -> Result<Stats> {
        let conn = self.connection()?;
        let total_scans: i64 = conn.query_row("SELECT COUNT(*) FROM scans", [], |row| row.get(0))?;
        let (total_feedback, average): (i64, Option<f64>) = conn.query_row(
            "SELECT COUNT(*), AVG(rating) FROM feedback",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(Stats {
            live_visitors: 0,
            total_scans,
            total_feedback,
            average_rating: average.map(|a| (a * 100.0).round() / 100.0),
        })
    }

    /// Delete every scan and feedback row
    pub fn clear_all(&self) -> Result<Cleared> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let feedback = tx.execute("DELETE FROM feedback", [])?;
        let scans = tx.execute("DELETE FROM scans", [])?;
        tx.commit()?;

        info!("Cleared {} scans and {} feedback entries", scans, feedback);
        Ok(Cleared { scans, feedback })
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(Vec::new()),
    }
}

fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<ScanRecord> {
    let kids_rating: Option<String> = row.get(10)?;
    let kids_safety = match kids_rating {
        Some(rating) => Some(KidsSafetySummary {
            rating,
            score: row.get::<_, Option<u8>>(11)?.unwrap_or_default(),
            confidence: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
            sources: json_column(row, 13)?,
            warnings: json_column(row, 14)?,
        }),
        None => None,
    };

    Ok(ScanRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        title: row.get(3)?,
        performance_score: row.get(4)?,
        grade: row.get(5)?,
        load_time: row.get(6)?,
        status_code: row.get(7)?,
        scan_method: row.get(8)?,
        is_safe: row.get(9)?,
        kids_safety,
        user_rating: row.get(15)?,
        comment: row.get(16)?,
        name: row.get(17)?,
        timestamp: row.get(18)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitescan_engine::ScanMethod;
    use tempfile::TempDir;

    fn open() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("nested").join("scans.db")).unwrap();
        db.init_tables().unwrap();
        (dir, db)
    }

    fn scan(domain: &str, rating: &str, performance_score: f64) -> NewScan {
        NewScan {
            url: format!("https://{}/", domain),
            domain: domain.to_string(),
            title: domain.to_string(),
            performance_score,
            grade: "A".to_string(),
            load_time: 812.5,
            status_code: 200,
            scan_method: ScanMethod::Fallback,
            is_safe: true,
            kids_safety: Some(KidsSafetySummary {
                rating: rating.to_string(),
                score: 70,
                confidence: "low".to_string(),
                sources: vec!["google_safe_browsing".to_string()],
                warnings: vec![],
            }),
        }
    }

    fn feedback(rating: u8, scan_id: Option<i64>) -> NewFeedback {
        NewFeedback {
            rating,
            comment: Some("nice".to_string()),
            name: "Happy Otter".to_string(),
            scan_id,
        }
    }

    #[test]
    fn init_is_idempotent() {
        let (_dir, db) = open();
        db.init_tables().unwrap();
        assert!(db.path().ends_with("scans.db"));
    }

    #[test]
    fn inserted_scan_reads_back() {
        let (_dir, db) = open();
        let stored = db.insert_scan(&scan("example.com", "TEEN", 91.5)).unwrap();

        let loaded = db.get_scan(stored.id).unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(loaded.kids_safety.unwrap().sources, vec!["google_safe_browsing"]);
        assert!(db.get_scan(stored.id + 100).unwrap().is_none());
    }

    #[test]
    fn latest_by_domain_prefers_newest() {
        let (_dir, db) = open();
        db.insert_scan(&scan("example.com", "TEEN", 50.0)).unwrap();
        let newer = db.insert_scan(&scan("example.com", "PARENTAL_GUIDANCE", 60.0)).unwrap();
        db.insert_scan(&scan("other.org", "TEEN", 70.0)).unwrap();

        let found = db.find_latest_by_domain("Example.com").unwrap().unwrap();
        assert_eq!(found.id, newer.id);
        assert!(db.find_latest_by_domain("missing.net").unwrap().is_none());

        let recent = db.recent_scans(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].domain, "other.org");
    }

    #[test]
    fn search_filters_sorts_and_pages() {
        let (_dir, db) = open();
        db.insert_scan(&scan("kids.example.com", "SAFE_FOR_ALL", 40.0)).unwrap();
        db.insert_scan(&scan("adult.example.com", "MATURE", 90.0)).unwrap();
        db.insert_scan(&scan("news.example.com", "TEEN", 70.0)).unwrap();
        db.insert_scan(&scan("unrelated.org", "SAFE_FOR_ALL", 99.0)).unwrap();

        let all = db
            .search_scans(&SearchQuery {
                q: "example".to_string(),
                sort: SearchSort::Score,
                ..SearchQuery::default()
            })
            .unwrap();
        assert_eq!(all.total, 3);
        let domains: Vec<_> = all.results.iter().map(|r| r.domain.as_str()).collect();
        assert_eq!(domains, vec!["adult.example.com", "news.example.com", "kids.example.com"]);

        let safe = db
            .search_scans(&SearchQuery {
                q: "example".to_string(),
                filter: SearchFilter::Safe,
                ..SearchQuery::default()
            })
            .unwrap();
        assert_eq!(safe.total, 1);
        assert_eq!(safe.results[0].domain, "kids.example.com");

        let unsafe_only = db
            .search_scans(&SearchQuery {
                q: "example".to_string(),
                filter: SearchFilter::Unsafe,
                ..SearchQuery::default()
            })
            .unwrap();
        assert_eq!(unsafe_only.results[0].domain, "adult.example.com");

        let second_page = db
            .search_scans(&SearchQuery {
                q: "example".to_string(),
                sort: SearchSort::Name,
                page: Some(2),
                per_page: Some(2),
                ..SearchQuery::default()
            })
            .unwrap();
        assert_eq!(second_page.total, 3);
        assert_eq!(second_page.results.len(), 1);
        assert_eq!(second_page.results[0].domain, "news.example.com");
    }

    #[test]
    fn search_returns_one_row_per_domain() {
        let (_dir, db) = open();
        db.insert_scan(&scan("example.com", "TEEN", 10.0)).unwrap();
        let latest = db.insert_scan(&scan("example.com", "TEEN", 20.0)).unwrap();

        let page = db.search_scans(&SearchQuery::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.results[0].id, latest.id);
    }

    #[test]
    fn like_wildcards_are_literal() {
        let (_dir, db) = open();
        db.insert_scan(&scan("example.com", "TEEN", 10.0)).unwrap();
        let page = db
            .search_scans(&SearchQuery {
                q: "%".to_string(),
                ..SearchQuery::default()
            })
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn feedback_links_to_a_scan_once() {
        let (_dir, db) = open();
        let stored = db.insert_scan(&scan("example.com", "TEEN", 10.0)).unwrap();

        let first = db.insert_feedback(&feedback(4, Some(stored.id))).unwrap();
        assert_eq!(first.scan_id, Some(stored.id));

        let rated = db.get_scan(stored.id).unwrap().unwrap();
        assert_eq!(rated.user_rating, Some(4));
        assert_eq!(rated.name.as_deref(), Some("Happy Otter"));

        let err = db.insert_feedback(&feedback(1, Some(stored.id))).unwrap_err();
        assert_eq!(
            err.downcast_ref::<LinkError>(),
            Some(&LinkError::AlreadyRated(stored.id))
        );
        assert_eq!(db.get_scan(stored.id).unwrap().unwrap().user_rating, Some(4));
        assert_eq!(db.recent_feedback(10).unwrap().len(), 1);

        let err = db.insert_feedback(&feedback(3, Some(999))).unwrap_err();
        assert_eq!(
            err.downcast_ref::<LinkError>(),
            Some(&LinkError::ScanNotFound(999))
        );
    }

    #[test]
    fn stats_and_clear() {
        let (_dir, db) = open();
        let empty = db.stats().unwrap();
        assert_eq!(empty.total_scans, 0);
        assert_eq!(empty.average_rating, None);

        db.insert_scan(&scan("example.com", "TEEN", 10.0)).unwrap();
        db.insert_feedback(&feedback(4, None)).unwrap();
        db.insert_feedback(&feedback(5, None)).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_scans, 1);
        assert_eq!(stats.total_feedback, 2);
        assert_eq!(stats.average_rating, Some(4.5));

        let recent = db.recent_feedback(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].rating, 5);

        let cleared = db.clear_all().unwrap();
        assert_eq!(cleared, Cleared { scans: 1, feedback: 2 });
        assert_eq!(db.stats().unwrap().total_scans, 0);
    }
}
