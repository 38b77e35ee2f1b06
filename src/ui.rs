use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use fluxo_grafico::{
    analyze_selection, AggregateOptions, ChartSeries, Selection, SheetOutcome, SheetReport,
    Workbook,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::BTreeSet;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    SheetSelection,
    Analysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
}

impl Period {
    pub fn toggle(&self) -> Self {
        match self {
            Period::Daily => Period::Weekly,
            Period::Weekly => Period::Daily,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Period::Daily => "Diário",
            Period::Weekly => "Semanal",
        }
    }
}

pub struct App {
    pub workbook: Workbook,
    pub options: AggregateOptions,
    pub current_page: Page,
    pub sheet_state: TableState,
    /// Indexes into `workbook.sheet_names`
    pub checked: BTreeSet<usize>,
    pub reports: Vec<SheetReport>,
    pub current_report: usize,
    pub period: Period,
    pub table_state: TableState,
    pub status: Option<String>,
}

impl App {
    pub fn new(workbook: Workbook, options: AggregateOptions) -> Self {
        let mut sheet_state = TableState::default();
        if !workbook.sheet_names.is_empty() {
            sheet_state.select(Some(0));
        }

        Self {
            workbook,
            options,
            current_page: Page::SheetSelection,
            sheet_state,
            checked: BTreeSet::new(),
            reports: Vec::new(),
            current_report: 0,
            period: Period::Daily,
            table_state: TableState::default(),
            status: None,
        }
    }

    pub fn toggle_checked(&mut self) {
        if let Some(i) = self.sheet_state.selected() {
            if !self.checked.remove(&i) {
                self.checked.insert(i);
            }
        }
    }

    pub fn toggle_all(&mut self) {
        if self.checked.len() == self.workbook.sheet_names.len() {
            self.checked.clear();
        } else {
            self.checked = (0..self.workbook.sheet_names.len()).collect();
        }
    }

    pub fn selection(&self) -> Selection {
        Selection::new(
            self.checked
                .iter()
                .filter_map(|i| self.workbook.sheet_names.get(*i).cloned()),
        )
    }

    /// Run the checked sheets. An empty selection only sets a warning.
    pub fn analyze(&mut self) {
        match analyze_selection(&self.workbook, &self.selection(), &self.options) {
            Ok(reports) => {
                self.reports = reports;
                self.current_report = 0;
                self.current_page = Page::Analysis;
                self.status = None;
                self.reset_table();
            }
            Err(err) => {
                self.status = Some(err.to_string());
            }
        }
    }

    pub fn back_to_selection(&mut self) {
        self.current_page = Page::SheetSelection;
    }

    pub fn current(&self) -> Option<&SheetReport> {
        self.reports.get(self.current_report)
    }

    pub fn current_series(&self) -> Option<&ChartSeries> {
        let analysis = self.current()?.analysis()?;
        Some(match self.period {
            Period::Daily => &analysis.daily_chart,
            Period::Weekly => &analysis.weekly_chart,
        })
    }

    pub fn next_report(&mut self) {
        if !self.reports.is_empty() {
            self.current_report = (self.current_report + 1) % self.reports.len();
            self.reset_table();
        }
    }

    pub fn previous_report(&mut self) {
        if !self.reports.is_empty() {
            self.current_report =
                (self.current_report + self.reports.len() - 1) % self.reports.len();
            self.reset_table();
        }
    }

    pub fn toggle_period(&mut self) {
        self.period = self.period.toggle();
        self.reset_table();
    }

    fn reset_table(&mut self) {
        let has_rows = self.current_series().is_some_and(|s| !s.is_empty());
        self.table_state.select(if has_rows { Some(0) } else { None });
    }

    fn list_len(&self) -> usize {
        match self.current_page {
            Page::SheetSelection => self.workbook.sheet_names.len(),
            Page::Analysis => self.current_series().map(|s| s.len()).unwrap_or(0),
        }
    }

    fn list_state(&mut self) -> &mut TableState {
        match self.current_page {
            Page::SheetSelection => &mut self.sheet_state,
            Page::Analysis => &mut self.table_state,
        }
    }

    pub fn next(&mut self) {
        let len = self.list_len();
        if len == 0 {
            return;
        }
        let state = self.list_state();
        let i = match state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.list_len();
        if len == 0 {
            return;
        }
        let state = self.list_state();
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match (app.current_page, key.code) {
                (_, KeyCode::Char('q')) => return Ok(()),
                (Page::SheetSelection, KeyCode::Esc) => return Ok(()),
                (Page::SheetSelection, KeyCode::Char(' ')) => app.toggle_checked(),
                (Page::SheetSelection, KeyCode::Char('a')) => app.toggle_all(),
                (Page::SheetSelection, KeyCode::Enter) => app.analyze(),
                (Page::Analysis, KeyCode::Esc | KeyCode::Backspace) => app.back_to_selection(),
                (Page::Analysis, KeyCode::Tab) => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_report();
                    } else {
                        app.next_report();
                    }
                }
                (Page::Analysis, KeyCode::BackTab) => app.previous_report(),
                (Page::Analysis, KeyCode::Char('v')) => app.toggle_period(),
                (_, KeyCode::Down | KeyCode::Char('j')) => app.next(),
                (_, KeyCode::Up | KeyCode::Char('k')) => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::SheetSelection => render_sheet_selection(f, chunks[1], app),
        Page::Analysis => render_analysis(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        "Análise de Receita e Despesa",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];

    if app.current_page == Page::Analysis {
        spans.push(Span::raw("  |  "));
        for (i, report) in app.reports.iter().enumerate() {
            if i > 0 {
                spans.push(Span::raw(" │ "));
            }
            let style = if i == app.current_report {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else if report.is_ready() {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::Red)
            };
            spans.push(Span::styled(report.sheet.clone(), style));
        }
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&str]) -> Row<'static> {
    let cells: Vec<Cell> = titles
        .iter()
        .map(|h| {
            Cell::from(h.to_string()).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        })
        .collect();

    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_sheet_selection(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .workbook
        .sheet_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let checked = app.checked.contains(&i);
            let count = app.workbook.sheet(name).map(|s| s.row_count()).unwrap_or(0);
            let mark = if checked { "[x]" } else { "[ ]" };
            let style = if checked {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };

            Row::new(vec![
                Cell::from(mark).style(style),
                Cell::from(name.clone()).style(style),
                Cell::from(format!("{}", count)),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(32),
            Constraint::Length(10),
        ],
    )
    .header(header_row(&["", "Mês (sheet)", "Linhas"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Escolha os meses (sheets) para visualizar "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.sheet_state);
}

fn render_analysis(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(report) = app.current() else {
        return;
    };

    let analysis = match &report.outcome {
        SheetOutcome::Ready(analysis) => analysis,
        SheetOutcome::Failed { error, .. } => {
            let text = vec![
                Line::from(""),
                Line::from(Span::styled(
                    format!("  ❌ {}", error),
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
            ];
            let paragraph = Paragraph::new(text).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" Análise do mês: {} ", report.sheet)),
            );
            f.render_widget(paragraph, area);
            return;
        }
    };

    let (series, caption) = match app.period {
        Period::Daily => (analysis.daily_chart.clone(), analysis.daily_caption.clone()),
        Period::Weekly => (analysis.weekly_chart.clone(), analysis.weekly_caption.clone()),
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    render_chart(f, chunks[0], &series);
    render_series_table(f, chunks[1], &series, &caption, &mut app.table_state);
}

fn render_chart(f: &mut Frame, area: Rect, series: &ChartSeries) {
    let revenue: Vec<(f64, f64)> = series
        .revenue
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, *v))
        .collect();
    let expense: Vec<(f64, f64)> = series
        .expense
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, *v))
        .collect();

    let datasets = vec![
        Dataset::default()
            .name(series.revenue_label.clone())
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Green))
            .data(&revenue),
        Dataset::default()
            .name(series.expense_label.clone())
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(&expense),
    ];

    let x_max = series.len().saturating_sub(1).max(1) as f64;
    let y_min = series
        .revenue
        .iter()
        .chain(series.expense.iter())
        .copied()
        .fold(0.0, f64::min);
    let y_max = series.max_value().max(1.0);

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", series.title)),
        )
        .x_axis(
            Axis::default()
                .title(series.x_label.clone())
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(x_labels(series)),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::raw(format!("{:.0}", y_min)),
                    Span::raw(format!("{:.0}", (y_min + y_max) / 2.0)),
                    Span::raw(format!("{:.0}", y_max)),
                ]),
        );

    f.render_widget(chart, area);
}

/// First, middle and last x label
fn x_labels(series: &ChartSeries) -> Vec<Span<'static>> {
    let n = series.x.len();
    let picks: Vec<usize> = match n {
        0 => vec![],
        1 => vec![0],
        2 => vec![0, 1],
        _ => vec![0, n / 2, n - 1],
    };
    picks
        .into_iter()
        .map(|i| Span::raw(series.x[i].clone()))
        .collect()
}

fn render_series_table(
    f: &mut Frame,
    area: Rect,
    series: &ChartSeries,
    caption: &str,
    state: &mut TableState,
) {
    let rows: Vec<Row> = series
        .x
        .iter()
        .zip(series.revenue.iter().zip(series.expense.iter()))
        .map(|(x, (r, e))| {
            Row::new(vec![
                Cell::from(x.clone()),
                Cell::from(format!("{:.2}", r)).style(Style::default().fg(Color::Green)),
                Cell::from(format!("{:.2}", e)).style(Style::default().fg(Color::Red)),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(16),
        ],
    )
    .header(header_row(&[
        series.x_label.as_str(),
        series.revenue_label.as_str(),
        series.expense_label.as_str(),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" {} ", caption)),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = Vec::new();

    if let Some(status) = &app.status {
        status_spans.push(Span::styled(
            format!(" ⚠ {} ", status),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
        status_spans.push(Span::raw(" | "));
    }

    match app.current_page {
        Page::SheetSelection => {
            status_spans.push(Span::styled(
                format!(" {}/{} ", app.checked.len(), app.workbook.sheet_names.len()),
                Style::default().fg(Color::Cyan),
            ));
            status_spans.push(Span::raw(" | "));
            status_spans.push(Span::styled("Space", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" Select | "));
            status_spans.push(Span::styled("a", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" All | "));
            status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" Analyze | "));
        }
        Page::Analysis => {
            status_spans.push(Span::styled(
                format!(" {} ", app.period.title()),
                Style::default().fg(Color::Cyan),
            ));
            status_spans.push(Span::raw(" | "));
            status_spans.push(Span::styled("v", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" Daily/Weekly | "));
            status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" Sheet | "));
            status_spans.push(Span::styled("Esc", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" Back | "));
        }
    }

    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}
