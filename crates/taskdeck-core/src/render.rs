use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_deadline;
use crate::task::Task;
use crate::view::TaskView;

/// Terminal presentation of a [`TaskView`]: the overview bar, the task
/// table, and the pagination line. The view model never calls into here.
#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, view, now))]
    pub fn print_task_page(&mut self, view: &TaskView, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let overview = view.overview;
        writeln!(
            out,
            "Tasks: {} total, {} active, {} done ({}%)",
            overview.total, overview.active, overview.done, overview.percent_done
        )?;
        writeln!(out)?;

        if view.tasks.is_empty() {
            writeln!(out, "No tasks to show.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Pri".to_string(),
            "Status".to_string(),
            "Category".to_string(),
            "Deadline".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(view.tasks.len());
        for task in &view.tasks {
            let id = self.paint(&task.id, "33");

            let priority = task
                .priority
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());

            let status = task.status.view().to_string();

            let deadline = match task.deadline {
                Some(deadline) if task.is_overdue(now) => {
                    self.paint(&format!("{} (overdue)", format_deadline(deadline)), "31")
                }
                Some(deadline) => format_deadline(deadline),
                None => String::new(),
            };

            rows.push(vec![
                id,
                priority,
                status,
                task.display_category().to_string(),
                deadline,
                task.title.clone(),
            ]);
        }

        write_table(&mut out, headers, rows)?;

        if view.page_count > 1 {
            writeln!(out)?;
            writeln!(
                out,
                "Page {} of {} ({} matching)",
                view.page, view.page_count, view.total
            )?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, task, now))]
    pub fn print_task_info(&mut self, task: &Task, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "status      {}", task.status.view())?;
        writeln!(
            out,
            "priority    {}",
            task.priority.map(|p| p.to_string()).unwrap_or_default()
        )?;
        writeln!(out, "category    {}", task.display_category())?;

        if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
            writeln!(out, "description {description}")?;
        }
        if let Some(deadline) = task.deadline {
            let marker = if task.is_overdue(now) { " (overdue)" } else { "" };
            writeln!(out, "deadline    {}{marker}", format_deadline(deadline))?;
        }
        if let Some(owner) = task.owner_id.as_deref() {
            writeln!(out, "owner       {owner}")?;
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{strip_ansi, write_table};

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["\x1b[33mx\x1b[0m".to_string(), "yy".to_string()]],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8 table");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains('x'));
        assert!(lines[2].ends_with("yy "));
    }

    #[test]
    fn ansi_sequences_are_invisible() {
        assert_eq!(strip_ansi("\x1b[31mlate\x1b[0m"), "late");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
