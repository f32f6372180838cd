use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::error::AbsensiError;

const LIST_LIMIT: i64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub notification_id: i64,
    pub user_id: i64,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateNotificationRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BroadcastRequest {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResult {
    pub created_count: usize,
    pub created: Vec<Notification>,
}

impl Notification {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Notification {
            notification_id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            is_read: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn create(
        conn: &Connection,
        user_id: i64,
        title: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, AbsensiError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AbsensiError::Validation("Title is required".to_string()));
        }

        conn.query_row(
            "INSERT INTO notifications (user_id, title, body, is_read, created_at)
             VALUES (?, ?, ?, 0, ?)
             RETURNING notification_id, user_id, title, body, is_read, created_at",
            params![user_id, title, body, now.timestamp()],
            Self::from_row,
        )
        .map_err(|e| AbsensiError::from(e).on_foreign_key("Recipient not found", true))
    }

    /// The user's newest notifications, newest first.
    pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Self>, AbsensiError> {
        let mut stmt = conn.prepare(
            "SELECT notification_id, user_id, title, body, is_read, created_at
             FROM notifications
             WHERE user_id = ?
             ORDER BY created_at DESC, notification_id DESC
             LIMIT ?",
        )?;
        let notifications = stmt
            .query_map(params![user_id, LIST_LIMIT], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    /// Marks a notification read. Only its recipient may do so; anyone else
    /// gets `NotFound`.
    pub fn mark_read(conn: &Connection, id: i64, owner_id: i64) -> Result<Self, AbsensiError> {
        conn.query_row(
            "UPDATE notifications SET is_read = 1
             WHERE notification_id = ? AND user_id = ?
             RETURNING notification_id, user_id, title, body, is_read, created_at",
            params![id, owner_id],
            Self::from_row,
        )
        .optional()?
        .ok_or_else(|| AbsensiError::NotFound("Notification not found".to_string()))
    }

    /// Sends the same notification to every student account in one statement.
    pub fn broadcast_to_students(
        conn: &Connection,
        title: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<BroadcastResult, AbsensiError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AbsensiError::Validation("Title is required".to_string()));
        }

        let mut stmt = conn.prepare(
            "INSERT INTO notifications (user_id, title, body, is_read, created_at)
             SELECT user_id, ?, ?, 0, ? FROM users WHERE role = ?
             RETURNING notification_id, user_id, title, body, is_read, created_at",
        )?;
        let created = stmt
            .query_map(
                params![title, body, now.timestamp(), Role::Siswa],
                Self::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        info!("Broadcast '{}' to {} students", title, created.len());
        Ok(BroadcastResult {
            created_count: created.len(),
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_user, seed, test_db};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_create_and_list_newest_first() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);

        Notification::create(&conn, fx.student_user_id, "Old", "", at(100)).unwrap();
        let newer = Notification::create(&conn, fx.student_user_id, "New", "body", at(200)).unwrap();
        assert!(!newer.is_read);
        Notification::create(&conn, fx.admin_user_id, "Other", "", at(300)).unwrap();

        let list = Notification::list_for_user(&conn, fx.student_user_id).unwrap();
        let titles: Vec<_> = list.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[test]
    fn test_list_is_capped() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        for i in 0..(LIST_LIMIT + 5) {
            Notification::create(&conn, fx.student_user_id, &format!("n{}", i), "", at(i)).unwrap();
        }

        let list = Notification::list_for_user(&conn, fx.student_user_id).unwrap();
        assert_eq!(list.len() as i64, LIST_LIMIT);
        assert_eq!(list[0].title, format!("n{}", LIST_LIMIT + 4));
    }

    #[test]
    fn test_create_validates() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);

        assert!(matches!(
            Notification::create(&conn, fx.student_user_id, "  ", "", at(0)),
            Err(AbsensiError::Validation(_))
        ));
        assert!(matches!(
            Notification::create(&conn, 999, "Hi", "", at(0)),
            Err(AbsensiError::ForeignKey { bad_request: true, .. })
        ));
    }

    #[test]
    fn test_mark_read_only_by_owner() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        let n = Notification::create(&conn, fx.student_user_id, "Hi", "", at(0)).unwrap();

        assert!(matches!(
            Notification::mark_read(&conn, n.notification_id, fx.admin_user_id),
            Err(AbsensiError::NotFound(_))
        ));
        let read = Notification::mark_read(&conn, n.notification_id, fx.student_user_id).unwrap();
        assert!(read.is_read);
    }

    #[test]
    fn test_broadcast_reaches_only_students() {
        let (_dir, db) = test_db();
        let conn = db.get_connection().unwrap();
        let fx = seed(&conn);
        let second = insert_user(&conn, "S002", "siswa");

        let result = Notification::broadcast_to_students(&conn, "Libur", "Besok libur", at(0)).unwrap();
        assert_eq!(result.created_count, 2);
        let mut recipients: Vec<_> = result.created.iter().map(|n| n.user_id).collect();
        recipients.sort();
        assert_eq!(recipients, vec![fx.student_user_id, second]);
        assert!(Notification::list_for_user(&conn, fx.teacher_user_id)
            .unwrap()
            .is_empty());
    }
}
