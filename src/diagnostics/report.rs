//! Diagnostic results and their text rendering.

use chrono::NaiveDateTime;
use std::fmt;

/// One labeled assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<30} [{}] {}",
            self.name,
            if self.passed { "PASS" } else { "FAIL" },
            self.details
        )
    }
}

/// A named group of assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub results: Vec<TestResult>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Vec::new(),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, passed: bool, details: impl Into<String>) {
        self.results.push(TestResult {
            name: name.into(),
            passed,
            details: details.into(),
        });
    }

    /// True when the group made at least one assertion and all of them
    /// passed.
    pub fn passed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.passed)
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Test Case: {} [{}]",
            self.name,
            if self.passed() { "PASSED" } else { "FAILED" }
        )?;
        for result in &self.results {
            writeln!(f, "  {}", result)?;
        }
        Ok(())
    }
}

/// Every group from one run, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResults {
    pub timestamp: NaiveDateTime,
    pub cases: Vec<TestCase>,
}

impl TestResults {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            cases: Vec::new(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(TestCase::passed)
    }

    pub fn total_tests(&self) -> usize {
        self.cases.iter().map(|c| c.results.len()).sum()
    }

    pub fn passed_tests(&self) -> usize {
        self.cases
            .iter()
            .flat_map(|c| &c.results)
            .filter(|r| r.passed)
            .count()
    }

    pub fn case(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for TestResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== BLE SERVICE TEST RESULTS ===")?;
        writeln!(f, "Timestamp: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(
            f,
            "Overall Status: {}",
            if self.all_passed() { "PASSED" } else { "FAILED" }
        )?;
        writeln!(f, "Tests Passed: {}/{}", self.passed_tests(), self.total_tests())?;
        writeln!(f)?;
        for case in &self.cases {
            writeln!(f, "{}", case)?;
        }
        Ok(())
    }
}

/// Tally of a connection stress test.
#[derive(Debug, Clone, PartialEq)]
pub struct StressReport {
    pub timestamp: NaiveDateTime,
    pub iterations: u32,
    pub successes: u32,
}

impl StressReport {
    /// Success percentage; zero when no iterations ran.
    pub fn success_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.iterations) * 100.0
        }
    }

    /// e.g. `"60.0%"`
    pub fn success_rate_text(&self) -> String {
        format!("{:.1}%", self.success_rate())
    }

    /// Render as a single-group result set.
    pub fn to_test_results(&self) -> TestResults {
        let mut case = TestCase::new("Connection Stress Test");
        case.add(
            "Total iterations",
            true,
            format!("{} iterations", self.iterations),
        );
        case.add(
            "Successful connections",
            true,
            format!("{}/{}", self.successes, self.iterations),
        );
        case.add("Success rate", true, self.success_rate_text());

        let mut results = TestResults::new(self.timestamp);
        results.cases.push(case);
        results
    }
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_test_results())
    }
}
