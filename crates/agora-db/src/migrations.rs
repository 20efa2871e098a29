use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Apply any migrations the database file has not seen yet.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'user'
                            CHECK (role IN ('user', 'admin')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE questions (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                status      TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'approved', 'rejected')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_questions_status ON questions(status, created_at);

            CREATE TABLE answers (
                id          TEXT PRIMARY KEY,
                question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
                author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                body        TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'approved', 'rejected')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_answers_question ON answers(question_id, created_at);
            CREATE INDEX idx_answers_status ON answers(status, created_at);

            -- Question images deliberately do NOT cascade: question deletion
            -- runs as an explicit ordered sequence in the application, so the
            -- answer-image cascade and a question-image cascade can never
            -- converge on the same row.
            CREATE TABLE images (
                id          TEXT PRIMARY KEY,
                path        TEXT NOT NULL,
                question_id TEXT REFERENCES questions(id) ON DELETE RESTRICT,
                answer_id   TEXT REFERENCES answers(id) ON DELETE CASCADE,
                uploaded_at TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK (question_id IS NOT NULL OR answer_id IS NOT NULL)
            );

            CREATE INDEX idx_images_question ON images(question_id);
            CREATE INDEX idx_images_answer ON images(answer_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
