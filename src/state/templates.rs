use anyhow::Result;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{DateTime, Document, doc},
    options::ReturnDocument,
};

use crate::{
    error::{ApiError, ApiResult},
    models::{NotificationTemplate, NotificationType},
};

use super::AppState;

#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub is_active: Option<bool>,
}

/// Replaces every `{{name}}` placeholder found in `vars`. Unknown placeholders are left as written.
pub fn render_template(text: &str, vars: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn default_template(kind: NotificationType) -> (&'static str, &'static str) {
    match kind {
        NotificationType::PaymentReminder => (
            "แจ้งเตือนชำระค่าเช่า ห้อง {{roomNumber}}",
            "เรียน {{tenantName}}\n\nบิลค่าเช่าห้อง {{roomNumber}} ประจำเดือน {{period}} ยอด {{amount}} บาท จะครบกำหนดชำระในวันที่ {{dueDate}}\n\nขอบคุณค่ะ",
        ),
        NotificationType::PaymentVerified => (
            "ยืนยันการชำระเงิน ห้อง {{roomNumber}}",
            "เรียน {{tenantName}}\n\nการชำระเงินค่าเช่าห้อง {{roomNumber}} ประจำเดือน {{period}} ยอด {{amount}} บาท ได้รับการยืนยันแล้ว\n\nขอบคุณค่ะ",
        ),
        NotificationType::PaymentRejected => (
            "การชำระเงินไม่ผ่านการตรวจสอบ ห้อง {{roomNumber}}",
            "เรียน {{tenantName}}\n\nสลิปการชำระเงินค่าเช่าห้อง {{roomNumber}} ประจำเดือน {{period}} ไม่ผ่านการตรวจสอบ\nเหตุผล: {{reason}}\n\nกรุณาอัปโหลดสลิปใหม่อีกครั้ง",
        ),
        NotificationType::BillGenerated => (
            "บิลค่าเช่าประจำเดือน {{period}} ห้อง {{roomNumber}}",
            "เรียน {{tenantName}}\n\nบิลค่าเช่าห้อง {{roomNumber}} ประจำเดือน {{period}} ยอด {{amount}} บาท กรุณาชำระภายในวันที่ {{dueDate}}\n\nขอบคุณค่ะ",
        ),
        NotificationType::Overdue => (
            "ค่าเช่าเกินกำหนดชำระ ห้อง {{roomNumber}}",
            "เรียน {{tenantName}}\n\nบิลค่าเช่าห้อง {{roomNumber}} ประจำเดือน {{period}} ยอด {{amount}} บาท เกินกำหนดชำระตั้งแต่วันที่ {{dueDate}}\nกรุณาชำระโดยเร็ว",
        ),
    }
}

/// Inserts the built-in template for every type that has none yet. Edited templates are untouched.
pub async fn seed_default_templates(state: &AppState) -> Result<()> {
    for kind in NotificationType::ALL {
        let (subject, body) = default_template(kind);
        state
            .templates
            .update_one(
                doc! { "type": kind.as_str() },
                doc! { "$setOnInsert": {
                    "type": kind.as_str(),
                    "subject": subject,
                    "body": body,
                    "is_active": true,
                    "version": 1,
                    "updated_at": DateTime::now(),
                }},
            )
            .upsert(true)
            .await?;
    }
    Ok(())
}

pub async fn list_templates(state: &AppState) -> Result<Vec<NotificationTemplate>> {
    let cursor = state.templates.find(doc! {}).sort(doc! { "type": 1 }).await?;
    Ok(cursor.try_collect().await?)
}

pub async fn active_template(
    state: &AppState,
    kind: NotificationType,
) -> Result<Option<NotificationTemplate>> {
    Ok(state
        .templates
        .find_one(doc! { "type": kind.as_str(), "is_active": true })
        .await?)
}

/// Applies an admin edit and bumps the template version.
pub async fn update_template(
    state: &AppState,
    kind: NotificationType,
    update: TemplateUpdate,
) -> ApiResult<NotificationTemplate> {
    let mut set = Document::new();
    if let Some(subject) = update.subject {
        if subject.trim().is_empty() {
            return Err(ApiError::validation("หัวข้ออีเมลต้องไม่ว่าง"));
        }
        set.insert("subject", subject);
    }
    if let Some(body) = update.body {
        if body.trim().is_empty() {
            return Err(ApiError::validation("เนื้อหาอีเมลต้องไม่ว่าง"));
        }
        set.insert("body", body);
    }
    if let Some(active) = update.is_active {
        set.insert("is_active", active);
    }
    if set.is_empty() {
        return Err(ApiError::validation("ไม่มีข้อมูลที่ต้องการแก้ไข"));
    }
    set.insert("updated_at", DateTime::now());

    state
        .templates
        .find_one_and_update(
            doc! { "type": kind.as_str() },
            doc! { "$set": set, "$inc": { "version": 1 } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or(ApiError::NotFound("ไม่พบแม่แบบการแจ้งเตือน"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholders() {
        let out = render_template(
            "ห้อง {{roomNumber}} ยอด {{ amount }} บาท",
            &[("roomNumber", "101".into()), ("amount", "3,150.00".into())],
        );
        assert_eq!(out, "ห้อง 101 ยอด 3,150.00 บาท");
    }

    #[test]
    fn leaves_unknown_and_unterminated_placeholders() {
        assert_eq!(render_template("a {{missing}} b", &[]), "a {{missing}} b");
        assert_eq!(
            render_template("x {{open", &[("open", "y".into())]),
            "x {{open"
        );
    }

    #[test]
    fn repeated_placeholders_all_render() {
        let out = render_template("{{n}}-{{n}}", &[("n", "7".into())]);
        assert_eq!(out, "7-7");
    }

    #[test]
    fn every_type_has_a_default_mentioning_the_room() {
        for kind in NotificationType::ALL {
            let (subject, _) = default_template(kind);
            assert!(subject.contains("{{roomNumber}}") || subject.contains("{{period}}"));
        }
    }
}
