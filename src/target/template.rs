//! Markdown authorization form handed to operators before registration.

use chrono::{DateTime, Utc};

/// Render a blank authorization document for one target.
pub fn authorization_template(host: &str, name: &str, now: DateTime<Utc>) -> String {
    format!(
        r#"# Security Testing Authorization

## Target Information
- **Target System**: {name}
- **Target Host**: {host}
- **Authorization Date**: {date}
- **Authorized By**: [Name and Title]
- **Organization**: [Organization Name]

## Scope
- [List specific systems, networks, or applications authorized for testing]
- [Include IP ranges, domains, or specific endpoints]

## Out of Scope
- [List systems, networks, or applications that are OFF-LIMITS]
- [Include any restricted areas or forbidden actions]

## Testing Window
- **Start Date**: [Date]
- **End Date**: [Date]
- **Time Restrictions**: [Any time-based restrictions]

## Authorized Actions
- [ ] Network scanning
- [ ] Vulnerability assessment
- [ ] Configuration review
- [ ] Privilege enumeration
- [ ] Manual exploitation of confirmed findings

## Restrictions
- No testing of production systems during business hours
- No data destruction or modification without approval
- All actions must be logged
- Immediate notification required for critical findings

## Contact Information
- **Primary Contact**: [Name, Email, Phone]
- **Emergency Contact**: [Name, Email, Phone]

## Legal Acknowledgment
This document authorizes the named tester to conduct security testing on the
specified systems. All testing must comply with applicable laws and regulations.

**Authorized Signature**: ___________________________
**Date**: ___________________________
"#,
        name = name,
        host = host,
        date = now.to_rfc3339(),
    )
}
