//! All SQL lives here, exposed as methods on [`Database`].
//!
//! Multi-row writes (content creation, answer rejection, question deletion)
//! run inside a single transaction on the writer connection, so readers
//! never observe a half-applied cascade.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, params};
use rusqlite::types::ToSql;

use agora_types::models::Status;

use crate::Database;
use crate::models::{
    AnswerItem, AnswerRow, ImageRow, PendingAnswerItem, QuestionItem, QuestionRow, UserDeletion,
    UserRow,
};

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.password,
                    user.role,
                    user.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, email, password, role, created_at
                 FROM users WHERE id = ?1",
                [id],
                map_user,
            )
            .optional()
        })
    }

    /// Look a user up by username or email address; login accepts either.
    pub fn get_user_by_login(&self, username_or_email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, email, password, role, created_at
                 FROM users WHERE username = ?1 OR email = ?1",
                [username_or_email],
                map_user,
            )
            .optional()
        })
    }

    /// Duplicate check for registration and admin edits. `exclude` skips the
    /// row currently being updated.
    pub fn identity_taken(
        &self,
        username: &str,
        email: &str,
        exclude: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let taken: i64 = match exclude {
                Some(id) => conn.query_row(
                    "SELECT COUNT(*) FROM users
                     WHERE (username = ?1 OR email = ?2) AND id != ?3",
                    params![username, email, id],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
                    params![username, email],
                    |row| row.get(0),
                )?,
            };
            Ok(taken > 0)
        })
    }

    pub fn list_users(&self, search: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let rows = match search {
                Some(term) => {
                    let pattern = format!("%{}%", term.trim());
                    let mut stmt = conn.prepare(
                        "SELECT id, username, email, password, role, created_at
                         FROM users
                         WHERE username LIKE ?1 OR email LIKE ?1
                         ORDER BY username",
                    )?;
                    let rows = stmt
                        .query_map([&pattern], map_user)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, username, email, password, role, created_at
                         FROM users ORDER BY username",
                    )?;
                    let rows = stmt
                        .query_map([], map_user)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
            };
            Ok(rows)
        })
    }

    /// Returns false when no such user exists.
    pub fn update_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        role: &str,
        password_hash: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = match password_hash {
                Some(hash) => conn.execute(
                    "UPDATE users SET username = ?1, email = ?2, role = ?3, password = ?4
                     WHERE id = ?5",
                    params![username, email, role, hash, id],
                )?,
                None => conn.execute(
                    "UPDATE users SET username = ?1, email = ?2, role = ?3 WHERE id = ?4",
                    params![username, email, role, id],
                )?,
            };
            Ok(changed > 0)
        })
    }

    /// Delete a user unless they still own content. Authored questions and
    /// answers keep their rows, so such users cannot be removed.
    pub fn delete_user(&self, id: &str) -> Result<UserDeletion> {
        self.with_conn_mut(|conn| {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Ok(UserDeletion::NotFound);
            }

            let owned: i64 = conn.query_row(
                "SELECT (SELECT COUNT(*) FROM questions WHERE author_id = ?1)
                      + (SELECT COUNT(*) FROM answers WHERE author_id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            if owned > 0 {
                return Ok(UserDeletion::OwnsContent);
            }

            conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(UserDeletion::Deleted)
        })
    }

    pub fn count_admins(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )?)
        })
    }

    /// Admins other than `id`. Zero means `id` is the last one standing.
    pub fn count_other_admins(&self, id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin' AND id != ?1",
                [id],
                |row| row.get(0),
            )?)
        })
    }

    // -- Questions --

    /// Insert a question together with its image rows in one transaction.
    pub fn insert_question(&self, question: &QuestionRow, images: &[ImageRow]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO questions (id, title, body, author_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    question.id,
                    question.title,
                    question.body,
                    question.author_id,
                    question.status,
                    question.created_at
                ],
            )?;
            insert_images(&tx, images)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Search and paginate questions, newest first. `include_hidden` widens
    /// the view beyond approved content.
    pub fn list_questions(
        &self,
        search: Option<&str>,
        include_hidden: bool,
        page: u32,
        page_size: u32,
    ) -> Result<(i64, Vec<QuestionItem>)> {
        self.with_conn(|conn| {
            let pattern = search.map(|term| format!("%{}%", term));
            let mut filter = String::from(" WHERE 1=1");
            let mut bind: Vec<&dyn ToSql> = Vec::new();
            if let Some(pattern) = pattern.as_ref() {
                filter.push_str(" AND (q.title LIKE ? OR q.body LIKE ?)");
                bind.push(pattern);
                bind.push(pattern);
            }
            if !include_hidden {
                filter.push_str(" AND q.status = 'approved'");
            }

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM questions q{}", filter),
                bind.as_slice(),
                |row| row.get(0),
            )?;

            let limit = page_size as i64;
            let offset = (page as i64 - 1) * limit;
            let sql = format!(
                "SELECT q.id, q.title, q.body, u.username, q.status, q.created_at
                 FROM questions q
                 LEFT JOIN users u ON q.author_id = u.id{}
                 ORDER BY q.created_at DESC
                 LIMIT ? OFFSET ?",
                filter
            );
            let mut stmt = conn.prepare(&sql)?;
            bind.push(&limit);
            bind.push(&offset);
            let mut items = stmt
                .query_map(bind.as_slice(), map_question_item)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            attach_question_images(conn, &mut items)?;
            Ok((total, items))
        })
    }

    /// A question with its answers, or None when it does not exist or is
    /// hidden from the caller. Answers come back oldest first.
    pub fn get_question_detail(
        &self,
        id: &str,
        include_hidden: bool,
    ) -> Result<Option<(QuestionItem, Vec<AnswerItem>)>> {
        self.with_conn(|conn| {
            let question = conn
                .query_row(
                    "SELECT q.id, q.title, q.body, u.username, q.status, q.created_at
                     FROM questions q
                     LEFT JOIN users u ON q.author_id = u.id
                     WHERE q.id = ?1",
                    [id],
                    map_question_item,
                )
                .optional()?;
            let Some(mut question) = question else {
                return Ok(None);
            };
            if !include_hidden && question.status != Status::Approved.as_str() {
                return Ok(None);
            }

            attach_question_images(conn, std::slice::from_mut(&mut question))?;
            let answers = query_answers(conn, id, include_hidden)?;
            Ok(Some((question, answers)))
        })
    }

    pub fn question_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: i64 = conn.query_row(
                "SELECT COUNT(*) FROM questions WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            Ok(found > 0)
        })
    }

    pub fn pending_questions(&self) -> Result<Vec<QuestionItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT q.id, q.title, q.body, u.username, q.status, q.created_at
                 FROM questions q
                 LEFT JOIN users u ON q.author_id = u.id
                 WHERE q.status = 'pending'
                 ORDER BY q.created_at DESC",
            )?;
            let mut items = stmt
                .query_map([], map_question_item)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            attach_question_images(conn, &mut items)?;
            Ok(items)
        })
    }

    // -- Answers --

    pub fn insert_answer(&self, answer: &AnswerRow, images: &[ImageRow]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO answers (id, question_id, author_id, body, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    answer.id,
                    answer.question_id,
                    answer.author_id,
                    answer.body,
                    answer.status,
                    answer.created_at
                ],
            )?;
            insert_images(&tx, images)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Answers of one question, oldest first. An unknown question id simply
    /// yields an empty list.
    pub fn list_answers(&self, question_id: &str, include_hidden: bool) -> Result<Vec<AnswerItem>> {
        self.with_conn(|conn| query_answers(conn, question_id, include_hidden))
    }

    pub fn pending_answers(&self) -> Result<Vec<PendingAnswerItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.body, q.title, u.username, a.status, a.created_at
                 FROM answers a
                 JOIN questions q ON a.question_id = q.id
                 LEFT JOIN users u ON a.author_id = u.id
                 WHERE a.status = 'pending'
                 ORDER BY a.created_at DESC",
            )?;
            let mut items = stmt
                .query_map([], |row| {
                    Ok(PendingAnswerItem {
                        id: row.get(0)?,
                        body: row.get(1)?,
                        question_title: row.get(2)?,
                        author: row
                            .get::<_, Option<String>>(3)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        status: row.get(4)?,
                        created_at: row.get(5)?,
                        images: Vec::new(),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let ids: Vec<String> = items.iter().map(|a| a.id.clone()).collect();
            let mut images = fetch_answer_images(conn, &ids)?;
            for item in &mut items {
                item.images = images.remove(&item.id).unwrap_or_default();
            }
            Ok(items)
        })
    }

    // -- Moderation --

    /// Flip a question's review status. A plain flip: rejecting a question
    /// keeps its images, only deletion removes them.
    pub fn set_question_status(&self, id: &str, status: Status) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE questions SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_answer_status(&self, id: &str, status: Status) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE answers SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Reject an answer and drop its image rows in the same transaction.
    /// Returns the stored paths of the removed images so the caller can
    /// clean up the blobs, or None when the answer does not exist.
    pub fn reject_answer(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE answers SET status = ?1 WHERE id = ?2",
                params![Status::Rejected.as_str(), id],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let paths = collect_paths(&tx, "SELECT path FROM images WHERE answer_id = ?1", id)?;
            tx.execute("DELETE FROM images WHERE answer_id = ?1", [id])?;
            tx.commit()?;
            Ok(Some(paths))
        })
    }

    /// Delete a question and everything hanging off it, in one transaction:
    /// images of its answers, its own images, its answers, then the question
    /// row itself. Returns the stored paths of all removed images.
    pub fn delete_question(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let exists: i64 = tx.query_row(
                "SELECT COUNT(*) FROM questions WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Ok(None);
            }

            let mut paths = collect_paths(
                &tx,
                "SELECT i.path FROM images i
                 JOIN answers a ON i.answer_id = a.id
                 WHERE a.question_id = ?1",
                id,
            )?;
            paths.extend(collect_paths(
                &tx,
                "SELECT path FROM images WHERE question_id = ?1 AND answer_id IS NULL",
                id,
            )?);

            tx.execute(
                "DELETE FROM images WHERE answer_id IN
                 (SELECT id FROM answers WHERE question_id = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM images WHERE question_id = ?1", [id])?;
            tx.execute("DELETE FROM answers WHERE question_id = ?1", [id])?;
            tx.execute("DELETE FROM questions WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(Some(paths))
        })
    }
}

fn map_user(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_question_item(row: &rusqlite::Row) -> rusqlite::Result<QuestionItem> {
    Ok(QuestionItem {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        author: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        status: row.get(4)?,
        created_at: row.get(5)?,
        images: Vec::new(),
    })
}

fn insert_images(conn: &Connection, images: &[ImageRow]) -> Result<()> {
    for image in images {
        conn.execute(
            "INSERT INTO images (id, path, question_id, answer_id, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                image.id,
                image.path,
                image.question_id,
                image.answer_id,
                image.uploaded_at
            ],
        )?;
    }
    Ok(())
}

fn query_answers(
    conn: &Connection,
    question_id: &str,
    include_hidden: bool,
) -> Result<Vec<AnswerItem>> {
    let mut sql = String::from(
        "SELECT a.id, a.body, u.username, a.status, a.created_at
         FROM answers a
         LEFT JOIN users u ON a.author_id = u.id
         WHERE a.question_id = ?1",
    );
    if !include_hidden {
        sql.push_str(" AND a.status = 'approved'");
    }
    sql.push_str(" ORDER BY a.created_at");

    let mut stmt = conn.prepare(&sql)?;
    let mut items = stmt
        .query_map([question_id], |row| {
            Ok(AnswerItem {
                id: row.get(0)?,
                body: row.get(1)?,
                author: row
                    .get::<_, Option<String>>(2)?
                    .unwrap_or_else(|| "unknown".to_string()),
                status: row.get(3)?,
                created_at: row.get(4)?,
                images: Vec::new(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let ids: Vec<String> = items.iter().map(|a| a.id.clone()).collect();
    let mut images = fetch_answer_images(conn, &ids)?;
    for item in &mut items {
        item.images = images.remove(&item.id).unwrap_or_default();
    }
    Ok(items)
}

fn attach_question_images(conn: &Connection, items: &mut [QuestionItem]) -> Result<()> {
    let ids: Vec<String> = items.iter().map(|q| q.id.clone()).collect();
    let mut images = fetch_question_images(conn, &ids)?;
    for item in items {
        item.images = images.remove(&item.id).unwrap_or_default();
    }
    Ok(())
}

/// Image paths for a batch of questions, keyed by question id. Rows that
/// belong to an answer are excluded here; they surface on the answer.
fn fetch_question_images(
    conn: &Connection,
    ids: &[String],
) -> Result<HashMap<String, Vec<String>>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT question_id, path FROM images
         WHERE answer_id IS NULL AND question_id IN ({})
         ORDER BY uploaded_at, id",
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let bind: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
    let rows = stmt.query_map(bind.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (question_id, path) = row?;
        map.entry(question_id).or_default().push(path);
    }
    Ok(map)
}

fn fetch_answer_images(conn: &Connection, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT answer_id, path FROM images
         WHERE answer_id IN ({})
         ORDER BY uploaded_at, id",
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let bind: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
    let rows = stmt.query_map(bind.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (answer_id, path) = row?;
        map.entry(answer_id).or_default().push(path);
    }
    Ok(map)
}

fn collect_paths(conn: &Connection, sql: &str, id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([id], |row| row.get::<_, String>(0))?;
    let mut paths = Vec::new();
    for row in rows {
        paths.push(row?);
    }
    Ok(paths)
}

pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
